use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::ApiError;
use crate::state::AppState;
use crate::types::ControlMessage;

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub session: String,
}

/// Joins the requesting client to a session and streams its events.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let session_id = params.session.trim().to_string();
    if session_id.is_empty() {
        return ApiError::BadRequest("session query parameter is required".to_string())
            .into_response();
    }
    info!("🔌 WebSocket connection request for session: {}", session_id);

    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

fn to_text<T: Serialize>(message: &T) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!("❌ Failed to serialize WebSocket message: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, session_id: String, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.hub.join(&session_id).await;
    info!(
        "✅ WebSocket joined session={} listener={}",
        session_id, subscription.listener_id
    );

    let joined = ControlMessage::Joined {
        session_id: session_id.clone(),
    };
    if let Some(message) = to_text(&joined) {
        if let Err(e) = sender.send(message).await {
            warn!("❌ Failed to send join acknowledgement: {}", e);
        }
    }

    let mut event_count = 0usize;
    loop {
        tokio::select! {
            event = subscription.receiver.recv() => {
                let Some(event) = event else {
                    info!("📡 Event channel closed, ending WebSocket");
                    break;
                };
                let Some(message) = to_text(&event) else {
                    continue;
                };
                if let Err(e) = sender.send(message).await {
                    warn!("❌ Failed to send WebSocket message: {}", e);
                    break;
                }
                event_count += 1;
            }

            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" {
                            let _ = sender.send(Message::Text("pong".into())).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("🔌 WebSocket close received");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("❌ WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!("🔌 WebSocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.hub.leave(&session_id, subscription.listener_id).await;
    info!("📊 WebSocket forwarded {} events total", event_count);
    info!("🔌 WebSocket disconnected: session={}", session_id);
}
