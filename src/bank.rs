//! Question bank: subject -> (question, answer) pairs, with fuzzy subject resolution.

use std::collections::HashMap;

use tracing::debug;

use crate::util::{normalize_answer, normalize_subject};

/// Default similarity a subject must exceed to resolve to a known key.
pub const DEFAULT_SUBJECT_CUTOFF: f64 = 0.6;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuizPair {
  pub question: String,
  pub answer: String,
}

impl QuizPair {
  pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
    Self { question: question.into(), answer: answer.into() }
  }

  /// A pair can be graded only if its answer survives normalization.
  pub fn is_gradable(&self) -> bool {
    !self.question.trim().is_empty() && !normalize_answer(&self.answer).is_empty()
  }
}

#[derive(Clone, Debug)]
pub struct QuestionBank {
  subjects: HashMap<String, Vec<QuizPair>>,
  cutoff: f64,
}

impl Default for QuestionBank {
  fn default() -> Self {
    Self::new(DEFAULT_SUBJECT_CUTOFF)
  }
}

impl QuestionBank {
  pub fn new(cutoff: f64) -> Self {
    Self { subjects: HashMap::new(), cutoff }
  }

  /// Append a pair under the normalized subject. Empty subjects and ungradable pairs are ignored.
  pub fn insert(&mut self, subject: &str, pair: QuizPair) -> bool {
    let key = normalize_subject(subject);
    if key.is_empty() || !pair.is_gradable() {
      debug!(target: "quiz", %subject, "Skipping empty or ungradable question");
      return false;
    }
    self.subjects.entry(key).or_default().push(pair);
    true
  }

  /// Exact lookup on the normalized subject.
  pub fn lookup(&self, subject: &str) -> Option<&[QuizPair]> {
    self.subjects
      .get(&normalize_subject(subject))
      .map(Vec::as_slice)
      .filter(|pairs| !pairs.is_empty())
  }

  /// Best known key for `subject`: exact hit first, otherwise the most similar
  /// key whose score exceeds the cutoff.
  pub fn resolve(&self, subject: &str) -> Option<String> {
    let wanted = normalize_subject(subject);
    if self.subjects.contains_key(&wanted) {
      return Some(wanted);
    }

    let mut best: Option<(&String, f64)> = None;
    for key in self.subjects.keys() {
      let score = similarity(&wanted, key);
      // Ties go to the lexicographically smaller key so resolution is stable.
      let better = match best {
        None => true,
        Some((k, s)) => score > s || (score == s && key < k),
      };
      if better {
        best = Some((key, score));
      }
    }

    match best {
      Some((key, score)) if score > self.cutoff => {
        debug!(target: "quiz", %wanted, resolved = %key, score, "Fuzzy subject match");
        Some(key.clone())
      }
      _ => None,
    }
  }

  pub fn subjects(&self) -> impl Iterator<Item = &str> {
    self.subjects.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.subjects.values().map(Vec::len).sum()
  }
}

/// Similarity ratio in 0..=1: twice the longest common subsequence of chars
/// over the combined length.
pub fn similarity(a: &str, b: &str) -> f64 {
  let a: Vec<char> = a.chars().collect();
  let b: Vec<char> = b.chars().collect();
  let total = a.len() + b.len();
  if total == 0 {
    return 1.0;
  }

  let mut prev = vec![0usize; b.len() + 1];
  let mut curr = vec![0usize; b.len() + 1];
  for ca in &a {
    for (j, cb) in b.iter().enumerate() {
      curr[j + 1] = if ca == cb { prev[j] + 1 } else { prev[j + 1].max(curr[j]) };
    }
    std::mem::swap(&mut prev, &mut curr);
  }
  (2 * prev[b.len()]) as f64 / total as f64
}
