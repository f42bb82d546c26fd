//! Seed data: built-in question bank, adventure environments, level table,
//! and the last-resort fallback challenge.

use uuid::Uuid;

use crate::bank::{QuestionBank, QuizPair};
use crate::domain::{ChallengeSource, ExpectedAnswer, QuizChallenge};

/// Built-in questions so the bot is useful without config or an LLM.
pub fn seed_questions() -> Vec<(&'static str, &'static str, &'static str)> {
  vec![
    ("python syntax", "How do you comment out a line in Python?", "# This is a comment"),
    ("python syntax", "What's the keyword to define a function?", "def"),
    ("fallout lore", "What is the name of the supermutant city in Fallout 3?", "Underworld"),
    ("fallout lore", "Which vault number was your character from in Fallout 4?", "111"),
    ("german basics", "How do you say 'thank you' in German?", "danke"),
    ("german basics", "What is the German word for 'water'?", "Wasser"),
    ("wasteland survival", "Which chem removes radiation from your body?", "RadAway"),
    ("wasteland survival", "What bottled drink doubles as currency via its caps?", "Nuka-Cola"),
  ]
}

pub fn seed_bank(cutoff: f64) -> QuestionBank {
  let mut bank = QuestionBank::new(cutoff);
  for (subject, q, a) in seed_questions() {
    bank.insert(subject, QuizPair::new(q, a));
  }
  bank
}

/// Fallout-style opening sites.
pub fn seed_environments() -> Vec<String> {
  [
    "abandoned factories of Grafton",
    "irradiated wastes of the Glowing Sea",
    "crumbling vault beneath Vault 101",
    "toxic swamps near Point Pleasant",
    "deserted streets of Megaton",
    "burned-out shell of Rivet City",
    "radioactive tunnels under the Capitol",
    "flooded underpass by the Potomac",
    "ruined library of the Jefferson Memorial",
    "mutant-infested reactor control room",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

/// (level, minimum cumulative xp), levels 1..=20.
pub fn seed_level_thresholds() -> Vec<(u32, u64)> {
  vec![
    (1, 0), (2, 100), (3, 300), (4, 600), (5, 1000),
    (6, 1500), (7, 2100), (8, 2800), (9, 3600), (10, 4500),
    (11, 5500), (12, 6600), (13, 7800), (14, 9100), (15, 10500),
    (16, 12000), (17, 13600), (18, 15300), (19, 17100), (20, 19000),
  ]
}

/// Absolute last resort: a generic question nobody can get wrong.
pub fn fallback_challenge(subject: &str) -> QuizChallenge {
  QuizChallenge {
    id: Uuid::new_v4().to_string(),
    subject: subject.to_string(),
    question: format!("What is an advanced concept in {subject}?"),
    expected: ExpectedAnswer::Unverifiable,
    source: ChallengeSource::Fallback,
  }
}
