//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and transport adapters independently.

use serde::{Deserialize, Serialize};

use crate::domain::{StatBlock, UserRecord};

/// Discord's per-message limit; replies are chunked to fit.
pub const MAX_CHUNK_CHARS: usize = 2000;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Message {
        #[serde(rename = "userId")]
        user_id: String,
        text: String,
    },
    Profile {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Reply {
        chunks: Vec<String>,
    },
    Profile {
        profile: ProfileOut,
    },
    Error {
        message: String,
    },
}

/// Snapshot of a user's progression, used by both WS and HTTP.
#[derive(Debug, Serialize)]
pub struct ProfileOut {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub xp: u64,
    pub level: u32,
    pub stats: StatBlock,
    pub perks: Vec<String>,
    pub environment: Option<String>,
    pub step: u32,
    /// Question text of the open skill check, if any. Never the answer.
    #[serde(rename = "pendingQuestion")]
    pub pending_question: Option<String>,
}

pub fn to_profile(u: &UserRecord) -> ProfileOut {
    ProfileOut {
        user_id: u.user_id.clone(),
        xp: u.xp,
        level: u.level,
        stats: u.stats,
        perks: u.perks.clone(),
        environment: u.adventure.environment.clone(),
        step: u.adventure.step,
        pending_question: u.adventure.pending().map(|c| c.question.clone()),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct MessageIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub text: String,
}
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageOut {
    pub reply: String,
    pub chunks: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
