//! Vault Dwellers · Quiz & Adventure Backend
//!
//! - Axum HTTP + WebSocket API
//! - Optional LLM integration (Ollama, Open WebUI or OpenAI-compatible)
//! - Per-user progression persisted as JSON documents
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   AGENT_CONFIG_PATH : path to TOML config (prompts, game rules, question bank)
//!   USER_STORE_DIR    : directory for per-user JSON records (in-memory if unset)
//!   LLM_PROVIDER      : "ollama" | "open-webui" | "openai" (LLM disabled if unset)
//!   LLM_BASE_URL      : provider base URL
//!   LLM_API_KEY       : bearer token, optional for Ollama
//!   LLM_MODEL         : model name (provider default if unset)
//!   LLM_TIMEOUT_SECS  : request timeout (default 30)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod seeds;
mod bank;
mod matcher;
mod quiz;
mod ledger;
mod llm;
mod store;
mod session;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  // A missing .env is fine; real env vars still apply.
  dotenvy::dotenv().ok();
  telemetry::init_tracing();

  // Build shared application state (user store, LLM client, question bank, rules).
  let state = Arc::new(AppState::from_env().await?);

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "vault_bot", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "vault_bot", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "vault_bot", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!(target: "vault_bot", "Shutdown signal received");
}
