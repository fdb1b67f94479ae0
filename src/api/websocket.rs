//! Live-update WebSocket surface.
//!
//! On connect a subscriber receives a `snapshot` message with every battle,
//! then one `delta` message per state transition. A subscriber that falls
//! behind its bounded buffer is resynchronized with a fresh snapshot
//! instead of stalling the scheduler.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{EventBroadcaster, StreamMessage};

/// Message from a connected client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsClientMessage {
    /// Keepalive
    Ping,
}

/// Non-battle message to a connected client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsServerMessage {
    Pong,
}

/// WebSocket state
#[derive(Clone)]
pub struct WsContext {
    /// Live-update stream source
    pub broadcaster: EventBroadcaster,
}

/// Build the live-update routes
pub fn websocket_routes(broadcaster: EventBroadcaster) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(WsContext { broadcaster })
}

async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<WsContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: WsContext) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "Live-update subscriber connected");

    let (mut sender, mut receiver) = socket.split();

    let mut subscription = match ctx.broadcaster.subscribe().await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(%connection_id, "Subscription failed: {}", e);
            return;
        }
    };

    let snapshot = StreamMessage::Snapshot {
        battles: std::mem::take(&mut subscription.snapshot),
    };
    if send_json(&mut sender, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            delta = subscription.deltas.recv() => {
                match delta {
                    Ok(delta) => {
                        let message = StreamMessage::Delta { battle: delta.battle };
                        if send_json(&mut sender, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Dropped deltas are recovered through a full
                        // snapshot; ordering within the connection holds
                        // because the snapshot reflects all of them.
                        debug!(%connection_id, skipped, "Subscriber lagged, resyncing");
                        match ctx.broadcaster.snapshot().await {
                            Ok(battles) => {
                                let resync = StreamMessage::Snapshot { battles };
                                if send_json(&mut sender, &resync).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(%connection_id, "Resync snapshot failed: {}", e);
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(WsClientMessage::Ping) = serde_json::from_str(&text) {
                            if send_json(&mut sender, &WsServerMessage::Pong).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%connection_id, "Subscriber socket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    info!(%connection_id, "Live-update subscriber disconnected");
}

async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &T,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    sender.send(Message::Text(text.into())).await
}
