//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::protocol::{to_profile, ClientWsMessage, ServerWsMessage, MAX_CHUNK_CHARS};
use crate::logic::handle_utterance;
use crate::state::AppState;
use crate::util::chunk_text;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "vault_bot", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "vault_bot", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = reply_for_text(&txt, &state).await;

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "vault_bot", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "vault_bot", "WebSocket disconnected");
}

/// Parse one text frame and dispatch it; malformed frames become an `error` reply.
async fn reply_for_text(txt: &str, state: &AppState) -> ServerWsMessage {
  match serde_json::from_str::<ClientWsMessage>(txt) {
    Ok(incoming) => {
      debug!(target: "vault_bot", "WS received: {:?}", &incoming);
      handle_client_ws(incoming, state).await
    }
    Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
  }
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Message { user_id, text } => {
      let reply = handle_utterance(state, &user_id, &text).await;
      ServerWsMessage::Reply { chunks: chunk_text(&reply, MAX_CHUNK_CHARS) }
    }

    ClientWsMessage::Profile { user_id } => {
      let _guard = state.lock_user(&user_id).await;
      match state.load_user(&user_id).await {
        Ok(user) => ServerWsMessage::Profile { profile: to_profile(&user) },
        Err(e) => {
          error!(target: "vault_bot", %user_id, error = %e, "WS profile load failed");
          ServerWsMessage::Error { message: "profile unavailable".into() }
        }
      }
    }
  }
}
