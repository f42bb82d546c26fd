//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs basic request/result info.

use std::sync::Arc;
use axum::{extract::{State, Query}, http::StatusCode, Json, response::IntoResponse};
use tracing::{error, info, instrument};

use crate::protocol::*;
use crate::state::AppState;
use crate::logic::handle_utterance;
use crate::util::chunk_text;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, text_len = body.text.len()))]
pub async fn http_post_message(
  State(state): State<Arc<AppState>>,
  Json(body): Json<MessageIn>,
) -> impl IntoResponse {
  let reply = handle_utterance(&state, &body.user_id, &body.text).await;
  let chunks = chunk_text(&reply, MAX_CHUNK_CHARS);
  info!(target: "vault_bot", user_id = %body.user_id, chunks = chunks.len(), "HTTP message handled");
  Json(MessageOut { reply, chunks })
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_get_profile(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ProfileQuery>,
) -> Result<Json<ProfileOut>, (StatusCode, String)> {
  let _guard = state.lock_user(&q.user_id).await;
  match state.load_user(&q.user_id).await {
    Ok(user) => Ok(Json(to_profile(&user))),
    Err(e) => {
      error!(target: "vault_bot", user_id = %q.user_id, error = %e, "Profile load failed");
      Err((StatusCode::INTERNAL_SERVER_ERROR, "profile unavailable".into()))
    }
  }
}
