//! Text-completion collaborator: a single `complete(prompt) -> text` call.
//!
//! `ModelProvider` speaks to Ollama, Open WebUI or the OpenAI chat API.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum LlmError {
  #[error("HTTP error: {0}")]
  Http(String),
  #[error("Authentication failed")]
  Authentication,
  #[error("Malformed provider response: {0}")]
  Malformed(String),
}

/// Anything that turns a prompt into text. Injected into the quiz generator and chat.
#[async_trait]
pub trait TextCompletion: Send + Sync {
  async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
  Ollama,
  OpenWebUi,
  OpenAi,
}

impl ProviderKind {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "ollama" => Some(Self::Ollama),
      "open-webui" | "openwebui" => Some(Self::OpenWebUi),
      "openai" => Some(Self::OpenAi),
      _ => None,
    }
  }

  fn chat_path(self) -> &'static str {
    match self {
      Self::Ollama => "/api/generate",
      Self::OpenWebUi => "/api/chat/completions",
      Self::OpenAi => "/v1/chat/completions",
    }
  }

  fn as_str(self) -> &'static str {
    match self {
      Self::Ollama => "ollama",
      Self::OpenWebUi => "open-webui",
      Self::OpenAi => "openai",
    }
  }
}

#[derive(Clone)]
pub struct ModelProvider {
  pub client: reqwest::Client,
  pub kind: ProviderKind,
  pub base_url: String,
  pub api_key: Option<String>,
  pub model: String,
}

impl ModelProvider {
  /// Construct from LLM_PROVIDER + LLM_BASE_URL (both required); otherwise None.
  pub fn from_env() -> Option<Self> {
    let kind_raw = std::env::var("LLM_PROVIDER").ok()?;
    let Some(kind) = ProviderKind::parse(&kind_raw) else {
      warn!(target: "vault_bot", provider = %kind_raw, "Unsupported LLM_PROVIDER; LLM disabled");
      return None;
    };
    let base_url = std::env::var("LLM_BASE_URL").ok()?;
    let api_key = std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| default_model(kind).into());
    let timeout = std::env::var("LLM_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(30);

    Self::new(kind, &base_url, api_key, model, Duration::from_secs(timeout)).ok()
  }

  pub fn new(
    kind: ProviderKind,
    base_url: &str,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
  ) -> Result<Self, LlmError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| LlmError::Http(e.to_string()))?;
    Ok(Self {
      client,
      kind,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key,
      model,
    })
  }

  pub fn kind_name(&self) -> &'static str {
    self.kind.as_str()
  }

  fn package(&self, prompt: &str) -> Value {
    let payload = match self.kind {
      ProviderKind::Ollama => serde_json::to_value(GenerateRequest {
        model: &self.model,
        prompt,
        stream: false,
      }),
      ProviderKind::OpenWebUi | ProviderKind::OpenAi => serde_json::to_value(ChatCompletionRequest {
        model: &self.model,
        messages: vec![ChatMessageReq { role: "user", content: prompt }],
      }),
    };
    payload.unwrap_or(Value::Null)
  }

  fn unpackage(&self, body: Value) -> Result<String, LlmError> {
    let text = match self.kind {
      ProviderKind::Ollama => serde_json::from_value::<GenerateResponse>(body)
        .map(|r| r.response)
        .map_err(|e| LlmError::Malformed(e.to_string()))?,
      ProviderKind::OpenWebUi | ProviderKind::OpenAi => {
        let r = serde_json::from_value::<ChatCompletionResponse>(body)
          .map_err(|e| LlmError::Malformed(e.to_string()))?;
        if let Some(usage) = &r.usage {
          info!(target: "vault_bot", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "LLM usage");
        }
        r.choices.into_iter().next().and_then(|c| c.message.content)
      }
    };
    Ok(text.unwrap_or_default().trim().to_string())
  }
}

#[async_trait]
impl TextCompletion for ModelProvider {
  #[instrument(level = "info", skip(self, prompt), fields(provider = self.kind.as_str(), model = %self.model, prompt_len = prompt.len()))]
  async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
    let url = format!("{}{}", self.base_url, self.kind.chat_path());
    let mut req = self.client.post(&url)
      .header(USER_AGENT, "vault-dwellers-bot/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&self.package(prompt));
    if let Some(key) = &self.api_key {
      req = req.header(AUTHORIZATION, format!("Bearer {}", key));
    }

    let start = Instant::now();
    let res = req.send().await.map_err(|e| LlmError::Http(e.to_string()))?;
    let status = res.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
      return Err(LlmError::Authentication);
    }
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let msg = extract_provider_error(&body).unwrap_or(body);
      return Err(LlmError::Http(format!("HTTP {}: {}", status, msg)));
    }

    let body: Value = res.json().await.map_err(|e| LlmError::Malformed(e.to_string()))?;
    let text = self.unpackage(body)?;
    info!(target: "vault_bot", elapsed = ?start.elapsed(), reply_len = text.len(), "LLM reply received");
    Ok(text)
  }
}

fn default_model(kind: ProviderKind) -> &'static str {
  match kind {
    ProviderKind::Ollama | ProviderKind::OpenWebUi => "llama3",
    ProviderKind::OpenAi => "gpt-4o-mini",
  }
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct GenerateRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  stream: bool,
}
#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)] response: Option<String>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessageReq<'a>>,
}
#[derive(Serialize)]
struct ChatMessageReq<'a> { role: &'a str, content: &'a str }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { #[serde(default)] content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_provider_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum EObj { Obj { message: String }, Text(String) }
  match serde_json::from_str::<EWrap>(body).ok()?.error {
    EObj::Obj { message } | EObj::Text(message) => Some(message),
  }
}
