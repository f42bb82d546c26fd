//! Answer matching: normalized comparison with a small edit-distance tolerance.

use tracing::{debug, instrument};

use crate::domain::ExpectedAnswer;
use crate::util::normalize_answer;

/// Typos tolerated by default (Levenshtein distance, inclusive).
pub const DEFAULT_MAX_TYPOS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
  pub passed: bool,
  pub unverifiable: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct AnswerMatcher {
  max_typos: usize,
}

impl Default for AnswerMatcher {
  fn default() -> Self {
    Self { max_typos: DEFAULT_MAX_TYPOS }
  }
}

impl AnswerMatcher {
  pub fn new(max_typos: usize) -> Self {
    Self { max_typos }
  }

  #[instrument(level = "debug", skip(self, user_answer, expected), fields(answer_len = user_answer.len()))]
  pub fn evaluate(&self, user_answer: &str, expected: &ExpectedAnswer) -> Verdict {
    let canonical = match expected {
      ExpectedAnswer::Unverifiable => return Verdict { passed: true, unverifiable: true },
      ExpectedAnswer::Exact(a) => a,
    };

    let got = normalize_answer(user_answer);
    let want = normalize_answer(canonical);
    if got == want {
      return Verdict { passed: true, unverifiable: false };
    }
    if want.is_empty() {
      return Verdict { passed: false, unverifiable: false };
    }

    let distance = levenshtein(&got, &want);
    debug!(target: "quiz", distance, max = self.max_typos, "Answer differs from canonical");
    Verdict { passed: distance <= self.max_typos, unverifiable: false }
  }
}

/// Levenshtein edit distance over chars, two-row dynamic programming.
pub fn levenshtein(a: &str, b: &str) -> usize {
  let a: Vec<char> = a.chars().collect();
  let b: Vec<char> = b.chars().collect();
  if a.is_empty() { return b.len(); }
  if b.is_empty() { return a.len(); }

  let mut prev: Vec<usize> = (0..=b.len()).collect();
  let mut curr = vec![0; b.len() + 1];
  for (i, ca) in a.iter().enumerate() {
    curr[0] = i + 1;
    for (j, cb) in b.iter().enumerate() {
      let cost = usize::from(ca != cb);
      curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
    }
    std::mem::swap(&mut prev, &mut curr);
  }
  prev[b.len()]
}
