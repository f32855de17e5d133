use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Full snapshot, tagged so clients can tell it apart from notifications.
async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
) -> bool {
    let snapshot = state.snapshot_rx.borrow().clone();
    let payload = serde_json::json!({ "type": "snapshot", "snapshot": snapshot });
    sender
        .send(Message::Text(payload.to_string().into()))
        .await
        .is_ok()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_tx.subscribe();

    if !send_snapshot(&mut sender, &state).await {
        return;
    }

    // Forward change notifications to this client
    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ws_msg) => {
                    let Ok(json) = serde_json::to_string(&ws_msg) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                // Missed notifications: resync with the whole snapshot
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "ws client lagged, resending snapshot");
                    if !send_snapshot(&mut sender, &state).await {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Read (and discard) incoming messages; detect disconnect
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
}
