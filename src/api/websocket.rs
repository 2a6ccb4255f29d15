//! Agent command socket.
//!
//! Each socket gets one sender task that writes both its direct replies and the
//! order broadcasts, so the two never race on the sink. The reader loop owns
//! the registry entry and removes it when the socket ends.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::api::state::AppState;
use crate::coordination::ConnectionId;
use crate::protocol::{is_valid_brand, is_valid_placement, ClientMessage, ServerMessage};

/// Replies queued per socket before the reader waits on the writer
const REPLY_BUFFER: usize = 32;

/// GET /api/ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // Subscribe before anything else so no broadcast is missed
    let mut rx = state.ws_tx.subscribe();

    let id = state.registry.register(Utc::now()).await;
    info!(connection = id, "Agent connected");

    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(REPLY_BUFFER);

    let send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(msg) => msg,
                    None => break,
                },
                broadcast = rx.recv() => match broadcast {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(connection = id, skipped, "Agent lagging behind order broadcasts");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize WebSocket message: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                if let Some(reply) = handle_frame(&state, id, &text).await {
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => {
                    if let Some(reply) = handle_frame(&state, id, &text).await {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Err(_) => {
                    let reply = ServerMessage::error("Failed to parse message!");
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Close(_) => {
                break;
            }
        }
    }

    drop(reply_tx);
    send_task.abort();

    if let Some(conn) = state.registry.unregister(id).await {
        info!(connection = id, brand = %conn.brand, "Agent disconnected");
    }
}

/// Apply one text frame. Returns the direct reply, if any.
pub(crate) async fn handle_frame(
    state: &AppState,
    id: ConnectionId,
    raw: &str,
) -> Option<ServerMessage> {
    let msg = match raw.parse::<ClientMessage>() {
        Ok(msg) => msg,
        Err(e) => {
            debug!(connection = id, error = ?e, "Rejected frame");
            return e.reply_text().map(ServerMessage::error);
        }
    };

    match msg {
        ClientMessage::Brand { brand } => {
            if is_valid_brand(&brand) {
                state.registry.set_brand(id, &brand).await;
                debug!(connection = id, brand = %brand, "Agent identified");
            }
            None
        }
        ClientMessage::GetMap => {
            let current = state.history.current().await;
            Some(ServerMessage::map(current.file_ref, None))
        }
        ClientMessage::Ping => Some(ServerMessage::Pong),
        ClientMessage::PlacePixel { x, y, color } => {
            if is_valid_placement(x, y, color) {
                state.registry.touch(id, Utc::now()).await;
            }
            None
        }
    }
}
