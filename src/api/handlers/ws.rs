//! WebSocket subscriber endpoint
//!
//! The connection is write-only from the relay's side. Inbound frames are
//! read only to notice close; their content is ignored.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use super::ApiState;
use crate::broadcast::FanoutHub;

/// GET /ws
pub async fn ws_subscribe(State(state): State<ApiState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| serve_subscriber(socket, state.hub))
}

async fn serve_subscriber(socket: WebSocket, hub: std::sync::Arc<FanoutHub>) {
    let mut subscription = hub.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            outbound = subscription.recv() => {
                let Some(text) = outbound else { break };
                if let Err(e) = sender.send(Message::Text(text.to_string())).await {
                    debug!(subscriber_id = %subscription.id(), error = %e, "WebSocket write failed");
                    break;
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unsubscribe(subscription.id());
    let _ = sender.send(Message::Close(None)).await;
}
