//! Domain models: user records, SPECIAL stat blocks, adventure state and quiz challenges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Names of the seven SPECIAL attributes, in allocation order.
pub const STAT_NAMES: [&str; 7] = [
  "Strength", "Perception", "Endurance", "Charisma", "Intelligence", "Agility", "Luck",
];

/// Seven-attribute role-playing allocation. All-zero means "not allocated yet".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatBlock {
  pub strength: u32,
  pub perception: u32,
  pub endurance: u32,
  pub charisma: u32,
  pub intelligence: u32,
  pub agility: u32,
  pub luck: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
  #[error("expected 7 values, got {0}")]
  WrongCount(usize),
  #[error("stats sum to {sum}, expected {budget}")]
  WrongSum { sum: u64, budget: u32 },
}

impl StatBlock {
  /// Build a stat block from values in `STAT_NAMES` order. The sum must equal `budget`.
  pub fn allocate(values: &[u32], budget: u32) -> Result<Self, AllocationError> {
    let [strength, perception, endurance, charisma, intelligence, agility, luck]: [u32; 7] = values
      .try_into()
      .map_err(|_| AllocationError::WrongCount(values.len()))?;
    let sum: u64 = values.iter().map(|&v| u64::from(v)).sum();
    if sum != u64::from(budget) {
      return Err(AllocationError::WrongSum { sum, budget });
    }
    Ok(Self { strength, perception, endurance, charisma, intelligence, agility, luck })
  }

  pub fn values(&self) -> [u32; 7] {
    [
      self.strength, self.perception, self.endurance, self.charisma,
      self.intelligence, self.agility, self.luck,
    ]
  }

  pub fn total(&self) -> u64 {
    self.values().iter().map(|&v| u64::from(v)).sum()
  }

  pub fn is_allocated(&self) -> bool {
    self.total() > 0
  }

  /// Compact one-line rendering used inside LLM prompts.
  pub fn describe(&self) -> String {
    STAT_NAMES
      .iter()
      .zip(self.values())
      .map(|(name, v)| format!("{name}: {v}"))
      .collect::<Vec<_>>()
      .join(", ")
  }
}

/// Where did a quiz challenge come from?
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeSource {
  Bank,      // static or cached question bank
  Generated, // synthesized by the LLM
  Fallback,  // generic unverifiable question
}

/// The reference a submitted answer is judged against.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "answer", rename_all = "snake_case")]
pub enum ExpectedAnswer {
  Exact(String),
  /// No checkable answer: every reply passes.
  Unverifiable,
}

/// One open question awaiting an answer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizChallenge {
  pub id: String,
  pub subject: String,
  pub question: String,
  pub expected: ExpectedAnswer,
  pub source: ChallengeSource,
}

impl QuizChallenge {
  pub fn is_verifiable(&self) -> bool {
    matches!(self.expected, ExpectedAnswer::Exact(_))
  }

  pub fn canonical_answer(&self) -> Option<&str> {
    match &self.expected {
      ExpectedAnswer::Exact(a) => Some(a),
      ExpectedAnswer::Unverifiable => None,
    }
  }
}

/// What the adventure is waiting for. A pending challenge exists only under `Quiz`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Awaiting {
  #[default]
  None,
  Quiz { pending: QuizChallenge },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdventureState {
  /// Narrative location; `None` until an adventure is started.
  #[serde(default)]
  pub environment: Option<String>,
  #[serde(default)]
  pub step: u32,
  #[serde(default)]
  pub awaiting: Awaiting,
}

impl AdventureState {
  pub fn pending(&self) -> Option<&QuizChallenge> {
    match &self.awaiting {
      Awaiting::Quiz { pending } => Some(pending),
      Awaiting::None => None,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
  pub when: DateTime<Utc>,
  pub prompt: String,
  pub reply: String,
}

/// Full per-user record; loaded, mutated in memory, then saved whole.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
  pub user_id: String,
  #[serde(default)]
  pub xp: u64,
  #[serde(default = "first_level")]
  pub level: u32,
  #[serde(default)]
  pub stats: StatBlock,
  #[serde(default)]
  pub perks: Vec<String>,
  #[serde(default)]
  pub adventure: AdventureState,
  #[serde(default)]
  pub history: Vec<HistoryEntry>,
}

fn first_level() -> u32 { 1 }

impl UserRecord {
  /// Zeroed record for a user seen for the first time.
  pub fn new(user_id: impl Into<String>) -> Self {
    Self {
      user_id: user_id.into(),
      xp: 0,
      level: first_level(),
      stats: StatBlock::default(),
      perks: Vec::new(),
      adventure: AdventureState::default(),
      history: Vec::new(),
    }
  }

  /// Replace the stat block; leaves the record untouched when the allocation is invalid.
  pub fn allocate_stats(&mut self, values: &[u32], budget: u32) -> Result<(), AllocationError> {
    self.stats = StatBlock::allocate(values, budget)?;
    Ok(())
  }

  /// Append a chat exchange, keeping only the most recent `limit` entries.
  pub fn record_history(&mut self, prompt: &str, reply: &str, limit: usize) {
    self.history.push(HistoryEntry {
      when: Utc::now(),
      prompt: prompt.to_string(),
      reply: reply.to_string(),
    });
    if self.history.len() > limit {
      let excess = self.history.len() - limit;
      self.history.drain(..excess);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allocation_accepts_exact_budget() {
    let mut user = UserRecord::new("u1");
    user.allocate_stats(&[5, 5, 5, 5, 5, 2, 1], 28).unwrap();
    assert_eq!(user.stats.intelligence, 5);
    assert_eq!(user.stats.luck, 1);
    assert_eq!(user.stats.total(), 28);
  }

  #[test]
  fn allocation_rejects_wrong_sum_without_mutation() {
    let mut user = UserRecord::new("u1");
    user.allocate_stats(&[5, 5, 5, 5, 5, 2, 1], 28).unwrap();
    let before = user.stats;

    let err = user.allocate_stats(&[5, 5, 5, 5, 5, 2, 2], 28).unwrap_err();
    assert_eq!(err, AllocationError::WrongSum { sum: 29, budget: 28 });
    assert_eq!(user.stats, before);
  }

  #[test]
  fn allocation_sum_does_not_wrap() {
    assert_eq!(
      StatBlock::allocate(&[u32::MAX, 29, 0, 0, 0, 0, 0], 28),
      Err(AllocationError::WrongSum { sum: u64::from(u32::MAX) + 29, budget: 28 })
    );
    let maxed = StatBlock { strength: u32::MAX, luck: u32::MAX, ..StatBlock::default() };
    assert_eq!(maxed.total(), 2 * u64::from(u32::MAX));
  }

  #[test]
  fn allocation_rejects_wrong_count() {
    assert_eq!(
      StatBlock::allocate(&[10, 10, 8], 28),
      Err(AllocationError::WrongCount(3))
    );
  }

  #[test]
  fn new_record_is_idle_and_unallocated() {
    let user = UserRecord::new("u1");
    assert_eq!(user.level, 1);
    assert!(!user.stats.is_allocated());
    assert!(user.adventure.environment.is_none());
    assert!(user.adventure.pending().is_none());
  }

  #[test]
  fn history_is_capped() {
    let mut user = UserRecord::new("u1");
    for i in 0..5 {
      user.record_history(&format!("p{i}"), "r", 3);
    }
    assert_eq!(user.history.len(), 3);
    assert_eq!(user.history[0].prompt, "p2");
  }

  #[test]
  fn record_survives_json_with_pending_quiz() {
    let mut user = UserRecord::new("u1");
    user.adventure.environment = Some("deserted streets of Megaton".into());
    user.adventure.awaiting = Awaiting::Quiz {
      pending: QuizChallenge {
        id: "q1".into(),
        subject: "fallout lore".into(),
        question: "Which vault?".into(),
        expected: ExpectedAnswer::Exact("111".into()),
        source: ChallengeSource::Bank,
      },
    };
    let json = serde_json::to_string(&user).unwrap();
    let back: UserRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, user);
  }

  #[test]
  fn sparse_record_loads_with_defaults() {
    let back: UserRecord = serde_json::from_str(r#"{"user_id":"u9","xp":120}"#).unwrap();
    assert_eq!(back.xp, 120);
    assert_eq!(back.adventure.awaiting, Awaiting::None);
    assert!(back.perks.is_empty());
  }
}
