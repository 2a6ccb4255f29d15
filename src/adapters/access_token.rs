//! Painting service access token.
//!
//! The token is scraped from the canvas page and shared between the tile
//! source and the placement client. A background task refreshes it on a
//! fixed period; readers always see either the old or the new token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::coordination::ShutdownListener;
use crate::error::{PlaceError, Result};

const TOKEN_MARKER: &str = "\"accessToken\":\"";

/// Shared bearer token
#[derive(Debug, Clone)]
pub struct TokenStore {
    inner: Arc<RwLock<String>>,
}

impl TokenStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token.into())),
        }
    }

    pub async fn get(&self) -> String {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, token: String) {
        *self.inner.write().await = token;
    }

    /// `Authorization` header value
    pub async fn bearer(&self) -> String {
        format!("Bearer {}", self.get().await)
    }
}

/// Pull the token out of the canvas page markup.
pub fn extract_access_token(page: &str) -> Option<String> {
    let (_, rest) = page.split_once(TOKEN_MARKER)?;
    let token = rest.split('"').next()?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Fetch the canvas page and scrape a fresh token from it.
pub async fn fetch_access_token(http: &reqwest::Client, page_url: &str) -> Result<String> {
    let page = http
        .get(page_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    extract_access_token(&page)
        .ok_or_else(|| PlaceError::Auth(format!("no access token found on {}", page_url)))
}

/// Refresh `store` every `period` until shutdown. Failed refreshes keep the
/// previous token.
pub fn spawn_token_refresh(
    store: TokenStore,
    http: reqwest::Client,
    page_url: String,
    period: Duration,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while shutdown.sleep(period).await {
            match fetch_access_token(&http, &page_url).await {
                Ok(token) => {
                    store.set(token).await;
                    info!("Access token refreshed");
                }
                Err(e) => warn!("Access token refresh failed, keeping previous token: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_token_from_page() {
        let page = r#"<script>window.___r = {"user":{"session":{"accessToken":"abc-123.def","expires":"x"}}}</script>"#;
        assert_eq!(extract_access_token(page), Some("abc-123.def".to_string()));
    }

    #[test]
    fn test_missing_or_empty_token() {
        assert_eq!(extract_access_token("<html></html>"), None);
        assert_eq!(extract_access_token(r#"{"accessToken":""}"#), None);
    }

    #[tokio::test]
    async fn test_store_swaps_token() {
        let store = TokenStore::new("old");
        let reader = store.clone();
        store.set("new".to_string()).await;
        assert_eq!(reader.bearer().await, "Bearer new");
    }
}
