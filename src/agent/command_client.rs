//! Command server connection.
//!
//! Keeps one socket open to the command server, reconnecting after a fixed
//! delay whenever it drops. Every new order announced over it is downloaded
//! and published on a watch channel for the placement loop.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::agent::order_loader::{ActiveOrder, OrderLoader};
use crate::coordination::ShutdownListener;
use crate::error::{PlaceError, Result};
use crate::protocol::{ClientMessage, ServerMessage};

/// Command client configuration
#[derive(Debug, Clone)]
pub struct CommandClientConfig {
    pub url: String,
    pub brand: String,
    pub ping_interval: Duration,
    pub reconnect_delay: Duration,
}

pub struct CommandClient {
    config: CommandClientConfig,
    loader: OrderLoader,
    orders: watch::Sender<Option<Arc<ActiveOrder>>>,
    /// Messages from the placement loop, kept across reconnects
    outbox: mpsc::Receiver<ClientMessage>,
}

impl CommandClient {
    pub fn new(
        config: CommandClientConfig,
        loader: OrderLoader,
        orders: watch::Sender<Option<Arc<ActiveOrder>>>,
        outbox: mpsc::Receiver<ClientMessage>,
    ) -> Self {
        Self {
            config,
            loader,
            orders,
            outbox,
        }
    }

    /// Stay connected until shutdown.
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        info!("Connecting to command server at {}", self.config.url);

        loop {
            match self.connect_and_serve(&mut shutdown).await {
                Ok(()) => info!("Command server connection closed"),
                Err(e) => error!("Command server connection error: {}", e),
            }

            if shutdown.is_shutdown() {
                break;
            }
            info!("Reconnecting to command server in {:?}", self.config.reconnect_delay);
            if !shutdown.sleep(self.config.reconnect_delay).await {
                break;
            }
        }
        info!("Command client stopped");
    }

    async fn connect_and_serve(&mut self, shutdown: &mut ShutdownListener) -> Result<()> {
        let (ws_stream, _) = timeout(Duration::from_secs(10), connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| PlaceError::Timeout("command server connection timeout".to_string()))?
            .map_err(PlaceError::WebSocket)?;
        info!("Connected to command server");

        let (mut write, mut read) = ws_stream.split();

        send(&mut write, &ClientMessage::GetMap).await?;
        send(
            &mut write,
            &ClientMessage::Brand {
                brand: self.config.brand.clone(),
            },
        )
        .await?;

        let mut ping = interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ping.tick().await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                        Some(Ok(Message::Close(frame))) => {
                            info!("Command server closed the connection: {:?}", frame);
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(PlaceError::WebSocket(e)),
                        None => return Ok(()),
                    }
                }
                _ = ping.tick() => {
                    send(&mut write, &ClientMessage::Ping).await?;
                }
                Some(outgoing) = self.outbox.recv() => {
                    send(&mut write, &outgoing).await?;
                }
                _ = shutdown.wait() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("Close frame not sent: {}", e);
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let msg = match text.parse::<ServerMessage>() {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = ?e, "Ignoring command server frame");
                return;
            }
        };

        match msg {
            ServerMessage::Map { data, reason } => {
                info!(
                    "New map loaded (reason: {})",
                    reason.as_deref().unwrap_or("connected to server")
                );
                match self.loader.load(&data, reason).await {
                    Ok(order) => {
                        info!("New map loaded, {} pixels in total", order.real_work.len());
                        self.orders.send_replace(Some(Arc::new(order)));
                    }
                    Err(e) => warn!(file = %data, "Failed to load order: {}", e),
                }
            }
            ServerMessage::Toast { message, .. } => info!("Message from server: {}", message),
            ServerMessage::Error { data } => warn!("Command server error: {}", data),
            ServerMessage::Pong => debug!("Pong"),
        }
    }
}

async fn send<S>(sink: &mut S, msg: &ClientMessage) -> Result<()>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
