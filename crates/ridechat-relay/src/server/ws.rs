//! WebSocket transport for chat connections.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::registry::OutboundFrame;

use super::routes::AppState;

/// Per-connection outbound buffer. Beyond this the client is too slow and
/// room frames are dropped for it.
const OUTBOUND_QUEUE: usize = 256;

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_QUEUE);

    let relay = state.relay;
    let mut session = relay.connect(tx).await;
    let conn_id = session.id();
    info!(conn_id, "Chat connection opened");

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => relay.handle_frame(&mut session, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    relay.disconnect(&session).await;
    send_task.abort();
    info!(conn_id, "Chat connection closed");
}
