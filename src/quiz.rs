//! Quiz generation: question bank first, LLM synthesis second, generic fallback last.
//!
//! Flow for `create(subject)`:
//! 1) Exact bank hit, then fuzzy subject resolution; pick one pair at random.
//! 2) Ask the injected LLM for a strict JSON `{question, answer}` object and
//!    repair what comes back (fences, missing opening/closing braces).
//! 3) If JSON fails, scan for literal `Question:` / `Answer:` markers.
//! 4) Otherwise return an unverifiable challenge. `create` never fails.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bank::{QuestionBank, QuizPair};
use crate::domain::{ChallengeSource, ExpectedAnswer, QuizChallenge};
use crate::llm::TextCompletion;
use crate::seeds::fallback_challenge;
use crate::util::{fill_template, normalize_subject, trunc_for_log};

pub const DEFAULT_SYNTHESIS_TEMPLATE: &str = "Generate exactly one challenging, detailed quiz question about '{subject}', \
aimed at a college-level student. \
Respond *only* with a valid JSON object with two keys, \"question\" and \"answer\", \
and do not wrap it in any markdown or extra text. Do not escape apostrophes with backslashes. \
Keep the answer short (a word or a short phrase). Example:\n\n\
{\n  \"question\": \"...your question here...?\",\n  \"answer\": \"...the correct answer...\"\n}";

#[derive(Clone)]
pub struct QuizGenerator {
  bank: Arc<RwLock<QuestionBank>>,
  llm: Option<Arc<dyn TextCompletion>>,
  template: String,
}

impl QuizGenerator {
  pub fn new(bank: Arc<RwLock<QuestionBank>>, llm: Option<Arc<dyn TextCompletion>>) -> Self {
    Self { bank, llm, template: DEFAULT_SYNTHESIS_TEMPLATE.to_string() }
  }

  /// Override the synthesis prompt (`{subject}` is substituted).
  pub fn with_template(mut self, template: impl Into<String>) -> Self {
    self.template = template.into();
    self
  }

  #[instrument(level = "info", skip(self), fields(has_llm = self.llm.is_some()))]
  pub async fn create(&self, subject: &str) -> QuizChallenge {
    let subject = normalize_subject(subject);

    if let Some(challenge) = self.from_bank(&subject).await {
      return challenge;
    }

    let Some(llm) = &self.llm else {
      warn!(target: "quiz", %subject, "No LLM configured; serving unverifiable fallback");
      return fallback_challenge(&subject);
    };

    let prompt = fill_template(&self.template, &[("subject", &subject)]);
    let raw = match llm.complete(&prompt).await {
      Ok(raw) => raw,
      Err(e) => {
        warn!(target: "quiz", %subject, error = %e, "Quiz synthesis call failed; serving unverifiable fallback");
        return fallback_challenge(&subject);
      }
    };
    debug!(target: "quiz", raw = %trunc_for_log(&raw, 400), "Raw synthesis reply");

    match parse_quiz_reply(&raw) {
      Some(pair) => {
        // Cache under the subject as requested (already normalized).
        self.bank.write().await.insert(&subject, pair.clone());
        info!(target: "quiz", %subject, "Synthesized and cached new question");
        QuizChallenge {
          id: Uuid::new_v4().to_string(),
          subject,
          question: pair.question,
          expected: ExpectedAnswer::Exact(pair.answer),
          source: ChallengeSource::Generated,
        }
      }
      None => {
        warn!(target: "quiz", %subject, reply_len = raw.len(), "Unparseable synthesis reply; serving unverifiable fallback");
        fallback_challenge(&subject)
      }
    }
  }

  async fn from_bank(&self, subject: &str) -> Option<QuizChallenge> {
    let bank = self.bank.read().await;
    let key = match bank.lookup(subject) {
      Some(_) => subject.to_string(),
      None => bank.resolve(subject)?,
    };
    let pair = bank.lookup(&key)?.choose(&mut rand::thread_rng())?.clone();
    debug!(target: "quiz", requested = %subject, %key, "Serving banked question");
    Some(QuizChallenge {
      id: Uuid::new_v4().to_string(),
      subject: key,
      question: pair.question,
      expected: ExpectedAnswer::Exact(pair.answer),
      source: ChallengeSource::Bank,
    })
  }
}

/// Extract a question/answer pair from semi-structured model output.
pub fn parse_quiz_reply(raw: &str) -> Option<QuizPair> {
  parse_json_pair(&repair_json(raw)).or_else(|| parse_marked_pair(raw))
}

/// Best-effort repair: drop code fences and escaped apostrophes, make sure the
/// text starts with `{`, and close any braces left open.
pub fn repair_json(raw: &str) -> String {
  let mut clean = strip_code_fence(raw.trim()).replace("\\'", "'");
  if !clean.starts_with('{') {
    clean.insert(0, '{');
  }
  let opens = clean.matches('{').count();
  let closes = clean.matches('}').count();
  if opens > closes {
    clean.push_str(&"}".repeat(opens - closes));
    debug!(target: "quiz", appended = opens - closes, "Balanced closing braces");
  }
  clean
}

fn strip_code_fence(s: &str) -> String {
  let Some(rest) = s.strip_prefix("```") else {
    return s.to_string();
  };
  // Skip the info string ("json") on the opening fence line.
  let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
  body.trim_end().trim_end_matches("```").trim().to_string()
}

fn parse_json_pair(text: &str) -> Option<QuizPair> {
  let value: Value = serde_json::from_str(text).ok()?;
  let question = field_text(value.get("question")?)?;
  let answer = field_text(value.get("answer")?)?;
  Some(QuizPair::new(question, answer)).filter(QuizPair::is_gradable)
}

/// Strings are trimmed; bare numbers/bools are accepted as their text form.
fn field_text(v: &Value) -> Option<String> {
  let s = match v {
    Value::String(s) => s.trim().to_string(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    _ => return None,
  };
  (!s.is_empty()).then_some(s)
}

fn parse_marked_pair(raw: &str) -> Option<QuizPair> {
  let (_, after_q) = raw.split_once("Question:")?;
  let (question, answer) = after_q.split_once("Answer:")?;
  Some(QuizPair::new(question.trim(), answer.trim())).filter(QuizPair::is_gradable)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::llm::testing::ScriptedLlm;
  use crate::seeds::seed_bank;

  fn generator(llm: Option<Arc<dyn TextCompletion>>) -> QuizGenerator {
    QuizGenerator::new(Arc::new(RwLock::new(seed_bank(0.6))), llm)
  }

  #[test]
  fn repairs_missing_closing_brace() {
    let pair = parse_quiz_reply(r#"{"question": "Q?", "answer": "A""#).unwrap();
    assert_eq!(pair, QuizPair::new("Q?", "A"));
  }

  #[test]
  fn repairs_missing_opening_brace() {
    let pair = parse_quiz_reply(r#" "question": "Q?", "answer": "A"} "#).unwrap();
    assert_eq!(pair, QuizPair::new("Q?", "A"));
  }

  #[test]
  fn strips_fences_and_escaped_apostrophes() {
    let raw = "```json\n{\"question\": \"What\\'s up?\", \"answer\": \" sky \"}\n```";
    assert_eq!(parse_quiz_reply(raw).unwrap(), QuizPair::new("What's up?", "sky"));
  }

  #[test]
  fn numeric_answers_are_accepted() {
    let pair = parse_quiz_reply(r#"{"question": "Vault?", "answer": 111}"#).unwrap();
    assert_eq!(pair.answer, "111");
  }

  #[test]
  fn falls_back_to_markers() {
    let pair = parse_quiz_reply("Question: What is X?\nAnswer: Y").unwrap();
    assert_eq!(pair, QuizPair::new("What is X?", "Y"));
  }

  #[test]
  fn empty_fields_are_rejected() {
    assert!(parse_quiz_reply(r#"{"question": "", "answer": "A"}"#).is_none());
    assert!(parse_quiz_reply("Question:   Answer: Y").is_none());
    assert!(parse_quiz_reply("").is_none());
    assert!(parse_quiz_reply("!!ERROR!! HTTP 500: boom").is_none());
  }

  #[test]
  fn punctuation_only_answers_are_rejected() {
    assert!(parse_quiz_reply(r#"{"question": "Q", "answer": "?!"}"#).is_none());
    assert!(parse_quiz_reply("Question: Q\nAnswer: —").is_none());
  }

  #[tokio::test]
  async fn ungradable_reply_is_not_cached() {
    let llm = Arc::new(ScriptedLlm::replying(&[r#"{"question": "Q", "answer": "?!"}"#]));
    let gen = generator(Some(llm));
    let c = gen.create("astrophysics").await;
    assert_eq!(c.expected, ExpectedAnswer::Unverifiable);
    assert_eq!(c.source, ChallengeSource::Fallback);
    assert_eq!(gen.bank.read().await.lookup("astrophysics"), None);
  }

  #[tokio::test]
  async fn bank_hit_does_not_call_llm() {
    let llm = Arc::new(ScriptedLlm::replying(&["unused"]));
    let gen = generator(Some(llm.clone()));
    let c = gen.create("  Fallout Lore ").await;
    assert_eq!(c.source, ChallengeSource::Bank);
    assert_eq!(c.subject, "fallout lore");
    assert!(c.is_verifiable());
    assert_eq!(llm.calls(), 0);
  }

  #[tokio::test]
  async fn fuzzy_subject_resolves_to_bank_key() {
    let gen = generator(None);
    let c = gen.create("german basic").await;
    assert_eq!(c.source, ChallengeSource::Bank);
    assert_eq!(c.subject, "german basics");
  }

  #[tokio::test]
  async fn synthesized_pair_is_cached_under_requested_subject() {
    let llm = Arc::new(ScriptedLlm::replying(&[r#"{"question": "Who wrote Dune?", "answer": "Frank Herbert""#]));
    let gen = generator(Some(llm.clone()));

    let c = gen.create("Sci-Fi Novels").await;
    assert_eq!(c.source, ChallengeSource::Generated);
    assert_eq!(c.question, "Who wrote Dune?");
    assert_eq!(c.canonical_answer(), Some("Frank Herbert"));
    assert!(llm.prompts.lock().unwrap()[0].contains("'sci-fi novels'"));

    let again = gen.create("sci-fi novels").await;
    assert_eq!(again.source, ChallengeSource::Bank);
    assert_eq!(llm.calls(), 1);
  }

  #[tokio::test]
  async fn empty_reply_yields_unverifiable_fallback() {
    let gen = generator(Some(Arc::new(ScriptedLlm::replying(&[""]))));
    let c = gen.create("quantum chromodynamics").await;
    assert_eq!(c.expected, ExpectedAnswer::Unverifiable);
    assert_eq!(c.source, ChallengeSource::Fallback);
    assert!(c.question.contains("quantum chromodynamics"));
  }

  #[tokio::test]
  async fn llm_error_yields_unverifiable_fallback() {
    let gen = generator(Some(Arc::new(ScriptedLlm::failing("timeout"))));
    let c = gen.create("astrophysics").await;
    assert_eq!(c.expected, ExpectedAnswer::Unverifiable);
    assert_eq!(gen.bank.read().await.lookup("astrophysics"), None);
  }

  #[tokio::test]
  async fn missing_llm_yields_unverifiable_fallback() {
    let c = generator(None).create("astrophysics").await;
    assert!(!c.is_verifiable());
  }
}
