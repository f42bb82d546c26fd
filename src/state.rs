//! Application state: user store, question bank, quiz generator, LLM handle and game rules.
//!
//! This module owns:
//!   - the user store (in-memory, or JSON files when USER_STORE_DIR is set)
//!   - the shared question bank (seeds + TOML entries + synthesized cache)
//!   - the optional LLM provider, injected into the quiz generator and chat
//!   - per-user locks that serialize load/mutate/save for one user id

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{info, instrument};

use crate::config::{load_agent_config_from_env, AgentConfig, Prompts};
use crate::domain::UserRecord;
use crate::ledger;
use crate::llm::{ModelProvider, TextCompletion};
use crate::quiz::QuizGenerator;
use crate::session::GameRules;
use crate::store::{JsonFileUserStore, MemoryUserStore, StoreError, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub quizzes: QuizGenerator,
    pub llm: Option<Arc<dyn TextCompletion>>,
    pub rules: Arc<GameRules>,
    pub prompts: Arc<Prompts>,
    user_locks: Arc<UserLocks>,
}

/// One async mutex per user id with a live interaction; entries go away with the last holder.
type UserLocks = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Held for the duration of one user's interaction.
pub struct UserGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: String,
    locks: Arc<UserLocks>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        // Release first so the map's Arc can become the only reference.
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(&self.user_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.user_id);
        }
    }
}

impl AppState {
    /// Build state from env: load config, choose the store, init the LLM provider.
    #[instrument(level = "info", skip_all)]
    pub async fn from_env() -> Result<Self, StoreError> {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let store: Arc<dyn UserStore> = match std::env::var("USER_STORE_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Arc::new(JsonFileUserStore::open(dir).await?),
            _ => {
                info!(target: "vault_bot", "USER_STORE_DIR not set; user records live in memory only.");
                Arc::new(MemoryUserStore::default())
            }
        };

        let llm: Option<Arc<dyn TextCompletion>> = match ModelProvider::from_env() {
            Some(p) => {
                info!(target: "vault_bot", provider = p.kind_name(), base_url = %p.base_url, model = %p.model, "LLM enabled.");
                Some(Arc::new(p))
            }
            None => {
                info!(target: "vault_bot", "LLM disabled (LLM_PROVIDER/LLM_BASE_URL not set). Using question bank and fallbacks.");
                None
            }
        };

        Ok(Self::new(&cfg, store, llm))
    }

    /// Wire everything from an already-loaded config. Used by `from_env` and tests.
    pub fn new(cfg: &AgentConfig, store: Arc<dyn UserStore>, llm: Option<Arc<dyn TextCompletion>>) -> Self {
        let bank = cfg.question_bank();
        let rules = cfg.game_rules();
        info!(
            target: "quiz",
            subjects = bank.subjects().count(),
            questions = bank.len(),
            levels = rules.levels.max_level(),
            "Startup question bank inventory"
        );

        let quizzes = QuizGenerator::new(Arc::new(RwLock::new(bank)), llm.clone())
            .with_template(cfg.prompts.quiz_synthesis.clone());

        Self {
            store,
            quizzes,
            llm,
            rules: Arc::new(rules),
            prompts: Arc::new(cfg.prompts.clone()),
            user_locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Exclusive access to one user's record for the duration of an interaction.
    pub async fn lock_user(&self, user_id: &str) -> UserGuard {
        let lock = {
            let mut locks = self.user_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(user_id.to_string()).or_default().clone()
        };
        UserGuard {
            guard: Some(lock.lock_owned().await),
            user_id: user_id.to_string(),
            locks: self.user_locks.clone(),
        }
    }

    /// Load a record with its level re-derived from xp under the current level table.
    pub async fn load_user(&self, user_id: &str) -> Result<UserRecord, StoreError> {
        let mut user = self.store.load(user_id).await?;
        ledger::sync_level(&mut user, &self.rules.levels);
        Ok(user)
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.user_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
