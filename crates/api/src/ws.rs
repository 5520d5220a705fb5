//! WebSocket progress subscriptions.
//!
//! Clients subscribe to either an owner group (all of one owner's
//! jobs) or an entity group (one target entity). Messages are the
//! serialized [`ProgressEvent`]s; delivery is best-effort and
//! non-persistent, so a client that connects late must fall back to
//! `GET /api/v1/jobs/{id}` for the current state.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use salonpost_core::types::DbId;
use salonpost_events::ProgressEvent;

use crate::state::AppState;

/// Outbound queue per connection; slow consumers drop messages.
const OUTBOUND_CAPACITY: usize = 64;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/progress", get(owner_progress))
        .route("/ws/progress/entity/{entity_id}", get(entity_progress))
}

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    owner_id: DbId,
}

/// GET /ws/progress?owner_id=.. -- subscribe to all of an owner's jobs.
async fn owner_progress(
    ws: WebSocketUpgrade,
    Query(query): Query<OwnerQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let events = state.bus.subscribe_owner(query.owner_id).await;
        handle_socket(socket, events, format!("owner:{}", query.owner_id)).await;
    })
}

/// GET /ws/progress/entity/{id} -- subscribe to one target entity.
async fn entity_progress(
    ws: WebSocketUpgrade,
    Path(entity_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let events = state.bus.subscribe_entity(&entity_id).await;
        handle_socket(socket, events, format!("entity:{entity_id}")).await;
    })
}

/// Manage one subscription connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Sends a greeting so the client knows the group it joined.
///   2. Spawns a sender task that drains the outbound queue.
///   3. Spawns a bridge task converting bus events to messages.
///   4. Answers `ping` text frames with a pong on the current task.
async fn handle_socket(socket: WebSocket, mut events: mpsc::Receiver<ProgressEvent>, group: String) {
    tracing::info!(group = %group, "Progress subscription connected");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    let greeting = serde_json::json!({
        "type": "connection_established",
        "group": group,
    });
    if out_tx
        .send(Message::Text(greeting.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    // Sender task: drain the outbound queue into the sink.
    let sender_group = group.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(group = %sender_group, "WebSocket sink closed");
                break;
            }
        }
    });

    // Bridge task: serialize bus events onto the outbound queue.
    let bridge_tx = out_tx.clone();
    let bridge_group = group.clone();
    let bridge_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(group = %bridge_group, error = %err, "Event serialization failed");
                    continue;
                }
            };
            if bridge_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound loop: answer pings, stop on close.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) if text.as_str().trim() == "ping" => {
                let pong = r#"{"type":"pong"}"#;
                if out_tx.send(Message::Text(pong.into())).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(group = %group, error = %err, "WebSocket receive error");
                break;
            }
        }
    }

    bridge_task.abort();
    send_task.abort();
    tracing::info!(group = %group, "Progress subscription disconnected");
}
