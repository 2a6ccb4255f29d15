//! Command protocol between the server and painting agents.
//!
//! Frames are JSON objects tagged by a `type` field. Tags are matched
//! case-insensitively, so `getMap`, `getmap` and `GETMAP` are the same command.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{palette_color, PixelIndex};

/// Identity an agent has before it sends a valid `brand`.
pub const UNKNOWN_BRAND: &str = "unknown";

pub const MAX_BRAND_LEN: usize = 32;

/// Agent → server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Brand {
        brand: String,
    },
    GetMap,
    Ping,
    PlacePixel {
        x: i64,
        y: i64,
        color: Option<i64>,
    },
}

impl ClientMessage {
    const TAGS: [&'static str; 4] = ["brand", "getmap", "ping", "placepixel"];
}

/// Server → agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Map {
        data: String,
        reason: Option<String>,
    },
    Pong,
    Toast {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<Value>,
    },
    Error {
        data: String,
    },
}

impl ServerMessage {
    const TAGS: [&'static str; 4] = ["map", "pong", "toast", "error"];

    pub fn error(data: impl Into<String>) -> Self {
        ServerMessage::Error { data: data.into() }
    }

    pub fn map(file: impl Into<String>, reason: Option<String>) -> Self {
        ServerMessage::Map {
            data: file.into(),
            reason,
        }
    }
}

/// Why an incoming frame could not be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not a JSON object
    Malformed,
    /// No string `type` field
    MissingType,
    /// `type` names no known command
    UnknownCommand(String),
    /// Known command with fields of the wrong shape
    InvalidPayload(String),
}

impl FrameError {
    /// Text for the `error` reply. `None` means the frame is dropped silently.
    pub fn reply_text(&self) -> Option<&'static str> {
        match self {
            FrameError::Malformed => Some("Failed to parse message!"),
            FrameError::MissingType => Some("Data missing type!"),
            FrameError::UnknownCommand(_) => Some("Unknown command!"),
            FrameError::InvalidPayload(_) => None,
        }
    }
}

fn decode_tagged<T: DeserializeOwned>(raw: &str, tags: &[&str]) -> Result<T, FrameError> {
    let mut value: Value = serde_json::from_str(raw).map_err(|_| FrameError::Malformed)?;
    let object = value.as_object_mut().ok_or(FrameError::Malformed)?;

    let tag = object
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .ok_or(FrameError::MissingType)?;
    if !tags.contains(&tag.as_str()) {
        return Err(FrameError::UnknownCommand(tag));
    }
    object.insert("type".to_string(), Value::String(tag.clone()));

    serde_json::from_value(value).map_err(|e| FrameError::InvalidPayload(format!("{tag}: {e}")))
}

impl std::str::FromStr for ClientMessage {
    type Err = FrameError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        decode_tagged(raw, &Self::TAGS)
    }
}

impl std::str::FromStr for ServerMessage {
    type Err = FrameError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        decode_tagged(raw, &Self::TAGS)
    }
}

/// Brands are 1..=32 characters of `[A-Za-z0-9-]`.
pub fn is_valid_brand(brand: &str) -> bool {
    (1..=MAX_BRAND_LEN).contains(&brand.len())
        && brand.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Coordinates must be on the canvas and the colour a palette index.
pub fn is_valid_placement(x: i64, y: i64, color: Option<i64>) -> bool {
    let on_canvas = u32::try_from(x)
        .ok()
        .zip(u32::try_from(y).ok())
        .and_then(|(x, y)| PixelIndex::from_coords(x, y))
        .is_some();
    let known_color = color
        .and_then(|c| u8::try_from(c).ok())
        .and_then(palette_color)
        .is_some();
    on_canvas && known_color
}
