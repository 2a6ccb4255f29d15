//! Live canvas tiles from the painting service.
//!
//! A tile's current image is only known once the service pushes a full-frame
//! message over a `graphql-ws` subscription, so every fetch opens a short-lived
//! subscription, waits for that push and then downloads the announced image.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::adapters::access_token::TokenStore;
use crate::agent::CanvasSource;
use crate::domain::{Raster, TileId, TILE_HEIGHT, TILE_WIDTH};
use crate::error::{PlaceError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const SUBPROTOCOL: &str = "graphql-ws";
const TEAM_OWNER: &str = "AFD2022";

const REPLACE_SUBSCRIPTION: &str = "subscription replace($input: SubscribeInput!) {\n  subscribe(input: $input) {\n    id\n    ... on BasicMessage {\n      data {\n        __typename\n        ... on FullFrameMessageData {\n          __typename\n          name\n          timestamp\n        }\n      }\n      __typename\n    }\n    __typename\n  }\n}";

/// `start` frame subscribing to full frames of one tile
pub fn subscribe_frame(tile: TileId) -> Value {
    json!({
        "id": "1",
        "type": "start",
        "payload": {
            "variables": {
                "input": {
                    "channel": {
                        "teamOwner": TEAM_OWNER,
                        "category": "CANVAS",
                        "tag": tile.get().to_string(),
                    }
                }
            },
            "extensions": {},
            "operationName": "replace",
            "query": REPLACE_SUBSCRIPTION,
        }
    })
}

/// Image URL announced by a frame-ready push, if `msg` is one.
pub fn announced_frame(msg: &Value) -> Option<&str> {
    msg.pointer("/payload/data/subscribe/data/name")
        .and_then(Value::as_str)
}

/// Append a cache buster so every fetch sees the latest frame.
fn uncached(url: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    let nonce: u64 = rand::thread_rng().gen();
    format!("{url}{sep}noCache={nonce}")
}

/// Canvas source backed by the painting service
pub struct GraphqlCanvasSource {
    client: reqwest::Client,
    ws_url: String,
    token: TokenStore,
    frame_timeout: Duration,
}

impl GraphqlCanvasSource {
    pub fn new(
        client: reqwest::Client,
        ws_url: impl Into<String>,
        token: TokenStore,
        frame_timeout: Duration,
    ) -> Self {
        Self {
            client,
            ws_url: ws_url.into(),
            token,
            frame_timeout,
        }
    }

    async fn connect(&self) -> Result<WsStream> {
        let mut request = self.ws_url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

        let (ws_stream, _) = timeout(Duration::from_secs(10), connect_async(request))
            .await
            .map_err(|_| PlaceError::Timeout("canvas WebSocket connection timeout".to_string()))?
            .map_err(PlaceError::WebSocket)?;
        Ok(ws_stream)
    }

    /// Subscribe to `tile` and wait for the service to announce its frame.
    async fn frame_url(&self, tile: TileId) -> Result<String> {
        let mut ws = self.connect().await?;

        let init = json!({
            "type": "connection_init",
            "payload": { "Authorization": self.token.bearer().await },
        });
        ws.send(Message::Text(init.to_string())).await?;
        ws.send(Message::Text(subscribe_frame(tile).to_string())).await?;

        let announced = timeout(self.frame_timeout, wait_for_frame(&mut ws))
            .await
            .map_err(|_| {
                PlaceError::Timeout(format!(
                    "tile {} frame not announced within {:?}",
                    tile, self.frame_timeout
                ))
            })?;

        if let Err(e) = ws.close(None).await {
            debug!(tile = %tile, "Canvas subscription close failed: {}", e);
        }
        announced
    }

    async fn download(&self, url: &str) -> Result<Raster> {
        let bytes = self
            .client
            .get(uncached(url))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let raster = tokio::task::spawn_blocking(move || Raster::decode(&bytes))
            .await
            .map_err(|e| PlaceError::Internal(format!("tile decode task failed: {}", e)))??;
        raster.ensure_size(TILE_WIDTH, TILE_HEIGHT)?;
        Ok(raster)
    }
}

async fn wait_for_frame(ws: &mut WsStream) -> Result<String> {
    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => {
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if let Some(name) = announced_frame(&value) {
                    return Ok(name.to_string());
                }
                debug!(kind = ?value.get("type"), "Ignoring canvas subscription message");
            }
            Message::Ping(data) => ws.send(Message::Pong(data)).await?,
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(PlaceError::Protocol(
        "canvas subscription closed before a frame was announced".to_string(),
    ))
}

#[async_trait]
impl CanvasSource for GraphqlCanvasSource {
    async fn fetch_tile(&self, tile: TileId) -> Result<Raster> {
        let fetched = async {
            let url = self.frame_url(tile).await?;
            debug!(tile = %tile, url = %url, "Tile frame announced");
            self.download(&url).await
        }
        .await;

        fetched.map_err(|e| match e {
            PlaceError::TileFetch { .. } => e,
            other => PlaceError::tile(tile.get(), other.to_string()),
        })
    }
}
