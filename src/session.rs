//! Per-user adventure state machine: idle -> exploring -> awaiting_answer -> exploring.
//!
//! A session borrows a loaded `UserRecord` for the duration of one interaction;
//! persistence stays with the caller.

use rand::seq::SliceRandom;
use tracing::{debug, info, instrument};

use crate::domain::{Awaiting, QuizChallenge, UserRecord};
use crate::ledger::{self, Award, LevelTable};
use crate::matcher::{AnswerMatcher, Verdict};
use crate::quiz::QuizGenerator;

const FALLBACK_ENVIRONMENT: &str = "irradiated wastes of the Glowing Sea";

/// Tunables shared by every session.
#[derive(Clone, Debug)]
pub struct GameRules {
  pub levels: LevelTable,
  pub environments: Vec<String>,
  pub default_subject: String,
  pub quiz_xp: u64,
  pub chat_xp: u64,
  pub stat_budget: u32,
  pub history_limit: usize,
  pub matcher: AnswerMatcher,
}

impl Default for GameRules {
  fn default() -> Self {
    Self {
      levels: LevelTable::default(),
      environments: crate::seeds::seed_environments(),
      default_subject: "fallout lore".into(),
      quiz_xp: 10,
      chat_xp: 1,
      stat_budget: 28,
      history_limit: 50,
      matcher: AnswerMatcher::default(),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
  Idle,
  Exploring,
  AwaitingAnswer,
}

/// Outcome of `submit_answer`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnswerOutcome {
  /// Caller error: nothing was asked. The record is untouched.
  NoQuizPending,
  Resolved {
    environment: String,
    verdict: Verdict,
    /// Canonical answer, revealed only on failure.
    revealed: Option<String>,
    award: Option<Award>,
  },
}

impl AnswerOutcome {
  pub fn narrate(&self) -> String {
    match self {
      AnswerOutcome::NoQuizPending => {
        "❌ No quiz in progress. Start one with `/adventure quiz <subject>`.".into()
      }
      AnswerOutcome::Resolved { environment, verdict, revealed, award } => {
        let mut out = if verdict.unverifiable {
          format!("✅ The terminals of the {environment} hum in approval. Your answer is accepted.")
        } else if verdict.passed {
          format!("✅ Skill check passed! You push deeper into the {environment}.")
        } else {
          format!(
            "❌ Skill check failed. The {environment} grows quiet. The correct answer was: {}",
            revealed.as_deref().unwrap_or("unknown")
          )
        };
        if let Some(a) = award {
          out.push_str(&format!("\n💠 You earned **{} XP**.", a.granted));
          if let Some(perk) = &a.perk {
            out.push_str(&format!(
              "\n🎉 **Level Up!** You're now Level {} and unlocked **{}**.",
              a.new_level, perk
            ));
          }
        }
        out
      }
    }
  }
}

pub struct AdventureSession<'a> {
  user: &'a mut UserRecord,
  quizzes: &'a QuizGenerator,
  rules: &'a GameRules,
}

impl<'a> AdventureSession<'a> {
  pub fn new(user: &'a mut UserRecord, quizzes: &'a QuizGenerator, rules: &'a GameRules) -> Self {
    Self { user, quizzes, rules }
  }

  pub fn state(&self) -> SessionState {
    let adv = &self.user.adventure;
    match (&adv.environment, &adv.awaiting) {
      (None, Awaiting::None) => SessionState::Idle,
      (_, Awaiting::Quiz { .. }) => SessionState::AwaitingAnswer,
      (Some(_), Awaiting::None) => SessionState::Exploring,
    }
  }

  pub fn pending(&self) -> Option<&QuizChallenge> {
    self.user.adventure.pending()
  }

  /// Pick a random environment, reset the step counter, drop any pending quiz.
  #[instrument(level = "info", skip(self), fields(user = %self.user.user_id))]
  pub fn start(&mut self) -> String {
    let env = self.rules
      .environments
      .choose(&mut rand::thread_rng())
      .cloned()
      .unwrap_or_else(|| FALLBACK_ENVIRONMENT.to_string());
    let adv = &mut self.user.adventure;
    adv.environment = Some(env.clone());
    adv.step = 1;
    adv.awaiting = Awaiting::None;
    info!(target: "vault_bot", environment = %env, "Adventure started");
    format!("🗺️ Your adventure begins in the {env}! Let's see how your SPECIAL guides you…")
  }

  /// Ask a new question. Starts the adventure if idle; replaces any unanswered question.
  #[instrument(level = "info", skip(self), fields(user = %self.user.user_id))]
  pub async fn request_quiz(&mut self, subject: Option<&str>) -> String {
    let intro = if self.state() == SessionState::Idle {
      format!("{}\n\n", self.start())
    } else {
      String::new()
    };
    if let Some(old) = self.pending() {
      debug!(target: "quiz", discarded = %old.id, "Overwriting unanswered question");
    }

    let subject = subject
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .unwrap_or(self.rules.default_subject.as_str())
      .to_string();
    let challenge = self.quizzes.create(&subject).await;
    let question = challenge.question.clone();
    let env = self.environment();
    info!(target: "quiz", id = %challenge.id, subject = %challenge.subject, source = ?challenge.source, verifiable = challenge.is_verifiable(), "Quiz issued");
    self.user.adventure.awaiting = Awaiting::Quiz { pending: challenge };

    format!("{intro}🧠 **Skill check** in the {env}:\n{question}\n\nReply with your answer.")
  }

  /// Judge a reply against the pending question, award xp on a pass, and close the question.
  #[instrument(level = "info", skip(self, text), fields(user = %self.user.user_id, answer_len = text.len()))]
  pub fn submit_answer(&mut self, text: &str) -> AnswerOutcome {
    let pending = match std::mem::take(&mut self.user.adventure.awaiting) {
      Awaiting::Quiz { pending } => pending,
      Awaiting::None => return AnswerOutcome::NoQuizPending,
    };

    let verdict = self.rules.matcher.evaluate(text, &pending.expected);
    self.user.adventure.step += 1;
    let award = verdict
      .passed
      .then(|| ledger::award(self.user, self.rules.quiz_xp, &self.rules.levels));
    info!(target: "quiz", id = %pending.id, passed = verdict.passed, unverifiable = verdict.unverifiable, "Answer evaluated");

    AnswerOutcome::Resolved {
      environment: self.environment(),
      verdict,
      revealed: if verdict.passed { None } else { pending.canonical_answer().map(str::to_string) },
      award,
    }
  }

  /// Back to idle; used after an external profile wipe.
  pub fn reset(&mut self) {
    self.user.adventure = Default::default();
  }

  fn environment(&self) -> String {
    self.user
      .adventure
      .environment
      .clone()
      .unwrap_or_else(|| FALLBACK_ENVIRONMENT.to_string())
  }
}
