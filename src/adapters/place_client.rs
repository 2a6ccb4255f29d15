use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::adapters::access_token::TokenStore;
use crate::agent::PlacementService;
use crate::domain::TileId;
use crate::error::{PlaceError, Result};

const PAINTING_ORIGIN: &str = "https://hot-potato.reddit.com";
const PAINTING_REFERER: &str = "https://hot-potato.reddit.com/";
const CLIENT_NAME: &str = "mona-lisa";

const SET_PIXEL_QUERY: &str = "mutation setPixel($input: ActInput!) {\n  act(input: $input) {\n    data {\n      ... on BasicMessage {\n        id\n        data {\n          ... on GetUserCooldownResponseMessageData {\n            nextAvailablePixelTimestamp\n            __typename\n          }\n          ... on SetPixelResponseMessageData {\n            timestamp\n            __typename\n          }\n          __typename\n        }\n        __typename\n      }\n      __typename\n    }\n    __typename\n  }\n}\n";

/// GraphQL `setPixel` body for canvas coordinates `(x, y)`.
/// The service addresses pixels per tile, so coordinates are tile-local.
pub fn set_pixel_body(x: u32, y: u32, color: u8) -> Value {
    let tile = TileId::containing(x, y);
    let (local_x, local_y) = TileId::local(x, y);
    json!({
        "operationName": "setPixel",
        "variables": {
            "input": {
                "actionName": "r/replace:set_pixel",
                "PixelMessageData": {
                    "coordinate": { "x": local_x, "y": local_y },
                    "colorIndex": color,
                    "canvasIndex": tile.get(),
                }
            }
        },
        "query": SET_PIXEL_QUERY,
    })
}

/// Placement client for the painting service GraphQL endpoint
pub struct GraphqlPlacementClient {
    client: reqwest::Client,
    url: String,
    token: TokenStore,
}

impl GraphqlPlacementClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>, token: TokenStore) -> Self {
        Self {
            client,
            url: url.into(),
            token,
        }
    }

    async fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static(PAINTING_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static(PAINTING_REFERER));
        headers.insert("apollographql-client-name", HeaderValue::from_static(CLIENT_NAME));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&self.token.bearer().await)
            .map_err(|e| PlaceError::Auth(format!("access token is not a valid header: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }
}

#[async_trait]
impl PlacementService for GraphqlPlacementClient {
    async fn place(&self, x: u32, y: u32, color: u8) -> Result<Value> {
        let body = set_pixel_body(x, y, color);
        debug!(x, y, color, "Submitting placement");

        // Rate-limit refusals come back as GraphQL errors with a 200, so the
        // body is parsed regardless of status.
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers().await?)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;
        debug!(%status, "Placement response received");
        Ok(payload)
    }
}
