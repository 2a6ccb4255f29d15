use thiserror::Error;

/// Main error type for the command server and the painting agent
#[derive(Error, Debug)]
pub enum PlaceError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection timeout: {0}")]
    Timeout(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    // Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    // Canvas errors
    #[error("Tile {tile} fetch failed: {reason}")]
    TileFetch { tile: u8, reason: String },

    #[error("Unexpected raster size: expected {expected_width}x{expected_height}, got {width}x{height}")]
    RasterSize {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    // Order errors
    #[error("Order rejected: {0}")]
    Rejected(#[from] OrderRejection),

    #[error("Persistence error: {0}")]
    Persistence(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for PlaceError
pub type Result<T> = std::result::Result<T, PlaceError>;

/// Reasons an order submission is turned away. The `Display` text is what the
/// submitter sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderRejection {
    #[error("Invalid password!")]
    InvalidCredentials,

    #[error("File has to be a PNG!")]
    NotPng,

    #[error("Error reading file!")]
    Unreadable,

    #[error("File has to be 2000x2000!")]
    WrongDimensions { len: usize },

    #[error("Pixel at {x}, {y} has invalid color.")]
    InvalidColor { x: u32, y: u32, color: String },
}

impl PlaceError {
    pub fn tile(tile: u8, reason: impl Into<String>) -> Self {
        PlaceError::TileFetch {
            tile,
            reason: reason.into(),
        }
    }
}
