//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Lowercase + trim. Subject keys in the question bank are stored in this form.
pub fn normalize_subject(s: &str) -> String {
  s.trim().to_lowercase()
}

/// Answer normalization: lowercase, drop everything that is not alphanumeric
/// or whitespace, collapse runs of whitespace.
pub fn normalize_answer(s: &str) -> String {
  let kept: String = s
    .to_lowercase()
    .chars()
    .filter(|c| c.is_alphanumeric() || c.is_whitespace())
    .collect();
  kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove `<@123>` / `<@!123>` mention tokens and trim the rest.
pub fn strip_mentions(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut rest = text;
  while let Some(start) = rest.find("<@") {
    let after = &rest[start + 2..];
    let body = after.strip_prefix('!').unwrap_or(after);
    let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && body[digits..].starts_with('>') {
      out.push_str(&rest[..start]);
      let consumed = (after.len() - body.len()) + digits + 1;
      rest = &after[consumed..];
    } else {
      out.push_str(&rest[..start + 2]);
      rest = after;
    }
  }
  out.push_str(rest);
  out.trim().to_string()
}

/// Split a reply into pieces of at most `max` chars, never inside a char.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
  if text.is_empty() || max == 0 {
    return Vec::new();
  }
  let chars: Vec<char> = text.chars().collect();
  chars.chunks(max).map(|c| c.iter().collect()).collect()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_fills_all_keys() {
    let out = fill_template("about '{subject}' ({subject})", &[("subject", "rust")]);
    assert_eq!(out, "about 'rust' (rust)");
  }

  #[test]
  fn answer_normalization_strips_punctuation_and_spacing() {
    assert_eq!(normalize_answer("  The  Underworld!! "), "the underworld");
    assert_eq!(normalize_answer("# This is a comment"), "this is a comment");
    assert_eq!(normalize_answer("?!"), "");
  }

  #[test]
  fn mentions_are_removed() {
    assert_eq!(strip_mentions("<@12345> /stats"), "/stats");
    assert_eq!(strip_mentions("hi <@!42> there"), "hi  there");
    assert_eq!(strip_mentions("a <@x> b"), "a <@x> b");
    assert_eq!(strip_mentions("<@99>"), "");
  }

  #[test]
  fn chunks_respect_limit_and_char_boundaries() {
    let text = "é".repeat(4500);
    let chunks = chunk_text(&text, 2000);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].chars().count(), 2000);
    assert_eq!(chunks[2].chars().count(), 500);
    assert!(chunk_text("", 2000).is_empty());
  }

  #[test]
  fn truncation_keeps_short_strings() {
    assert_eq!(trunc_for_log("short", 10), "short");
    assert!(trunc_for_log("0123456789abc", 4).starts_with("0123…"));
  }
}
