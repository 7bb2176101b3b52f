//! Observer WebSocket

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use sprocket_execution::{ObserverMessage, StatusBroadcaster, Supervisor};
use std::sync::Arc;

/// Upgrade to a WebSocket that receives every task status change
pub async fn ws_handler(ws: WebSocketUpgrade, State(supervisor): State<Arc<Supervisor>>) -> impl IntoResponse {
    let broadcaster = supervisor.broadcaster().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Register the connection, forward broadcaster output, drain inbound frames
///
/// Observers are write-only; anything they send besides a close is ignored.
async fn handle_socket(socket: WebSocket, broadcaster: Arc<StatusBroadcaster>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Observer connected");

    let mut rx = broadcaster.add(conn_id.clone()).await;
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let (frame, closing) = match msg {
                ObserverMessage::Text(text) => (Message::Text(text.into()), false),
                ObserverMessage::Close => (Message::Close(None), true),
            };
            if sink.send(frame).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Observer sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Observer receive error");
                break;
            }
        }
    }

    broadcaster.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Observer disconnected");
}
