use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ServerConfig;
use crate::coordination::ConnectionRegistry;
use crate::persistence::HistoryStore;
use crate::protocol::ServerMessage;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Committed orders
    pub history: Arc<HistoryStore>,

    /// Connected agents
    pub registry: Arc<ConnectionRegistry>,

    /// Order broadcast channel, one receiver per socket
    pub ws_tx: broadcast::Sender<ServerMessage>,

    /// Where accepted order images are written
    pub maps_dir: Arc<PathBuf>,

    /// Shared secret for order submission
    pub order_password: Option<Arc<str>>,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        history: Arc<HistoryStore>,
        registry: Arc<ConnectionRegistry>,
        config: &ServerConfig,
    ) -> Self {
        let (ws_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            history,
            registry,
            ws_tx,
            maps_dir: Arc::new(config.maps_dir.clone()),
            order_password: config.order_password.as_deref().map(Arc::from),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Fan a message out to every connected socket. Returns the number of
    /// sockets it was queued for; slow sockets lag without blocking others.
    pub fn broadcast(&self, msg: ServerMessage) -> usize {
        match self.ws_tx.send(msg) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("Broadcast with no connected agents");
                0
            }
        }
    }
}
