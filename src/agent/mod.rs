//! Painting agent
//!
//! Reconciles the live canvas toward the current order:
//! - `canvas`: assembles the live canvas from its four tiles
//! - `differ`: finds the pixels that still need painting
//! - `cooldown`: turns placement responses into wait times
//! - `scheduler`: the one-placement-at-a-time loop
//! - `command_client`: command server connection and order updates

pub mod canvas;
pub mod command_client;
pub mod cooldown;
pub mod differ;
pub mod order_loader;
pub mod scheduler;

pub use canvas::{assemble_canvas, CanvasSource};
pub use command_client::{CommandClient, CommandClientConfig};
pub use cooldown::{cooldown_delay, parse_placement_response, PlacementOutcome};
pub use differ::{pending_work, progress_percent, real_work};
pub use order_loader::{ActiveOrder, OrderLoader};
pub use scheduler::{PlacementScheduler, PlacementService};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::adapters::access_token::{fetch_access_token, spawn_token_refresh, TokenStore};
use crate::adapters::place_canvas::GraphqlCanvasSource;
use crate::adapters::place_client::GraphqlPlacementClient;
use crate::config::AgentConfig;
use crate::coordination::ShutdownListener;
use crate::error::{PlaceError, Result};

/// Placement reports buffered while the command socket is down
const OUTBOX_CAPACITY: usize = 64;

/// Run one agent until shutdown: token, then command connection, then the
/// placement loop.
pub async fn run_agent(config: &AgentConfig, shutdown: ShutdownListener) -> Result<()> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("place-orders/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()?;

    let token = match &config.access_token {
        Some(token) => {
            info!("Using configured access token");
            TokenStore::new(token.clone())
        }
        None => {
            info!("Getting access token...");
            let token = fetch_access_token(&http, &config.token_url).await?;
            info!("Access token acquired");
            let store = TokenStore::new(token);
            spawn_token_refresh(
                store.clone(),
                http.clone(),
                config.token_url.clone(),
                config.token_refresh_interval(),
                shutdown.clone(),
            );
            store
        }
    };

    let (orders_tx, orders_rx) = watch::channel(None);
    let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);

    let command = CommandClient::new(
        CommandClientConfig {
            url: config.command_url.clone(),
            brand: config.brand.clone(),
            ping_interval: config.ping_interval(),
            reconnect_delay: config.reconnect_delay(),
        },
        OrderLoader::new(http.clone(), config.maps_url.clone()),
        orders_tx,
        outbox_rx,
    );
    let command_task = tokio::spawn(command.run(shutdown.clone()));

    let canvas = Arc::new(GraphqlCanvasSource::new(
        http.clone(),
        config.canvas_ws_url.clone(),
        token.clone(),
        config.frame_timeout(),
    ));
    let placer = Arc::new(GraphqlPlacementClient::new(
        http,
        config.placement_url.clone(),
        token,
    ));

    PlacementScheduler::new(canvas, placer, orders_rx, outbox_tx)
        .run(shutdown)
        .await;

    command_task
        .await
        .map_err(|e| PlaceError::Internal(format!("command client task failed: {}", e)))?;
    info!("Agent stopped");
    Ok(())
}
