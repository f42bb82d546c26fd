//! Loading agent configuration (prompts, game rules, extra questions) from TOML.
//!
//! See `AgentConfig`, `Prompts` and `GameCfg` for the expected schema. Every
//! section is optional; missing values fall back to the built-in defaults.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::bank::{QuestionBank, QuizPair, DEFAULT_SUBJECT_CUTOFF};
use crate::ledger::LevelTable;
use crate::matcher::{AnswerMatcher, DEFAULT_MAX_TYPOS};
use crate::quiz::DEFAULT_SYNTHESIS_TEMPLATE;
use crate::seeds::{seed_bank, seed_environments};
use crate::session::GameRules;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub game: GameCfg,
  #[serde(default)]
  pub questions: Vec<QuestionCfg>,
}

/// Extra bank entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  pub subject: String,
  pub question: String,
  pub answer: String,
}

/// Prompts sent to the LLM. Defaults match the bot's Fallout tone.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// `{subject}` is substituted.
  pub quiz_synthesis: String,
  /// `{special}` and `{text}` are substituted.
  pub chat: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      quiz_synthesis: DEFAULT_SYNTHESIS_TEMPLATE.into(),
      chat: "You are the Pip-Boy companion of a Vault Dweller in a Fallout-style wasteland. \
Stay in character and keep replies short.\nYour SPECIAL stats: {special}\nUser says: {text}".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LevelCfg {
  pub level: u32,
  pub min_xp: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GameCfg {
  pub stat_budget: u32,
  pub quiz_xp: u64,
  pub chat_xp: u64,
  pub subject_cutoff: f64,
  pub max_typo_distance: usize,
  pub default_subject: String,
  pub history_limit: usize,
  pub environments: Vec<String>,
  pub levels: Vec<LevelCfg>,
}

impl Default for GameCfg {
  fn default() -> Self {
    let rules = GameRules::default();
    Self {
      stat_budget: rules.stat_budget,
      quiz_xp: rules.quiz_xp,
      chat_xp: rules.chat_xp,
      subject_cutoff: DEFAULT_SUBJECT_CUTOFF,
      max_typo_distance: DEFAULT_MAX_TYPOS,
      default_subject: rules.default_subject,
      history_limit: rules.history_limit,
      environments: seed_environments(),
      levels: Vec::new(),
    }
  }
}

impl AgentConfig {
  /// Game rules with config overrides applied. An invalid level table is
  /// logged and replaced by the built-in one.
  pub fn game_rules(&self) -> GameRules {
    let g = &self.game;
    let levels = if g.levels.is_empty() {
      LevelTable::default()
    } else {
      let pairs = g.levels.iter().map(|l| (l.level, l.min_xp)).collect();
      LevelTable::new(pairs).unwrap_or_else(|e| {
        error!(target: "vault_bot", error = %e, "Invalid level table in config; using built-in table");
        LevelTable::default()
      })
    };
    let environments = if g.environments.is_empty() {
      warn!(target: "vault_bot", "No environments configured; using built-in list");
      seed_environments()
    } else {
      g.environments.clone()
    };

    GameRules {
      levels,
      environments,
      default_subject: g.default_subject.clone(),
      quiz_xp: g.quiz_xp,
      chat_xp: g.chat_xp,
      stat_budget: g.stat_budget,
      history_limit: g.history_limit.max(1),
      matcher: AnswerMatcher::new(g.max_typo_distance),
    }
  }

  /// Built-in seed bank plus configured questions.
  pub fn question_bank(&self) -> QuestionBank {
    let mut bank = seed_bank(self.game.subject_cutoff);
    for q in &self.questions {
      if !bank.insert(&q.subject, QuizPair::new(q.question.trim(), q.answer.trim())) {
        error!(target: "quiz", subject = %q.subject, "Skipping bank item: empty subject, question or answer.");
      }
    }
    bank
  }
}

pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "vault_bot", %path, questions = cfg.questions.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "vault_bot", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "vault_bot", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
