use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;

use crate::state::AppState;

/// WebSocket handler for a single document's progress stream (§6):
/// newline-delimited JSON, one `ProgressMessage` per text frame.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(document_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, document_id, state))
}

async fn handle_socket(mut socket: WebSocket, document_id: String, state: Arc<AppState>) {
    let mut rx = match state.progress_bus.subscribe(&document_id).await {
        Ok(rx) => rx,
        Err(err) => {
            let _ = socket
                .send(Message::Text(serde_json::json!({"error": err.to_string()}).to_string().into()))
                .await;
            return;
        }
    };

    loop {
        match rx.recv().await {
            Ok(message) => {
                let terminal = matches!(
                    message.event,
                    docgraph_core::ProgressEvent::SummaryComplete { .. } | docgraph_core::ProgressEvent::Error { .. }
                );
                let Ok(encoded) = serde_json::to_string(&message) else {
                    continue;
                };
                if socket.send(Message::Text(encoded.into())).await.is_err() {
                    break;
                }
                if terminal {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
        }
    }

    state.progress_bus.unsubscribe(&document_id).await;
}
