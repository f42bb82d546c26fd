//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! One inbound utterance is handled to completion under the user's lock:
//! load record, dispatch, mutate, save, narrate.

use tracing::{error, info, instrument, warn};

use crate::domain::{UserRecord, STAT_NAMES};
use crate::ledger;
use crate::session::AdventureSession;
use crate::state::AppState;
use crate::util::{fill_template, strip_mentions};

const TERMINAL_MALFUNCTION: &str =
  "⚠️ Your Pip-Boy sputters and reboots. Something went wrong saving your progress; try again in a moment.";
const NEEDS_SPECIAL: &str = "⚠️ You need to set your SPECIAL stats first. Run `/start` to begin.";

/// What an utterance asks for. Command prefixes are case-insensitive.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
  AdventureStart,
  AdventureQuiz(Option<&'a str>),
  Answer(&'a str),
  Reset,
  Start,
  Allocate(Vec<u32>),
  Stats,
  Chat(&'a str),
}

impl<'a> Command<'a> {
  /// `quiz_pending` routes any non-adventure utterance to the open question.
  pub fn parse(text: &'a str, quiz_pending: bool) -> Self {
    let text = text.trim();
    let lower = text.to_lowercase();

    if lower.starts_with("/adventure start") {
      return Command::AdventureStart;
    }
    if lower.starts_with("/adventure quiz") {
      let subject = text
        .get("/adventure quiz".len()..)
        .map(str::trim)
        .filter(|s| !s.is_empty());
      return Command::AdventureQuiz(subject);
    }
    if quiz_pending {
      return Command::Answer(text);
    }
    if lower.starts_with("/reset") {
      return Command::Reset;
    }
    if lower.starts_with("/start") {
      return Command::Start;
    }
    if let Some(values) = parse_allocation(text) {
      return Command::Allocate(values);
    }
    if lower == "/stats" {
      return Command::Stats;
    }
    Command::Chat(text)
  }
}

/// Seven comma-separated non-negative integers.
fn parse_allocation(text: &str) -> Option<Vec<u32>> {
  let parts: Vec<&str> = text.split(',').map(str::trim).collect();
  if parts.len() != STAT_NAMES.len() {
    return None;
  }
  parts
    .iter()
    .map(|p| {
      if p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()) {
        return None;
      }
      p.parse::<u32>().ok()
    })
    .collect()
}

/// Handle one inbound utterance and return the narration to send back.
/// An empty string means "nothing to say" (e.g. the text was only a mention).
#[instrument(level = "info", skip(state, raw_text), fields(%user_id, text_len = raw_text.len()))]
pub async fn handle_utterance(state: &AppState, user_id: &str, raw_text: &str) -> String {
  let text = strip_mentions(raw_text);
  if text.is_empty() {
    return String::new();
  }

  let _guard = state.lock_user(user_id).await;
  let mut user = match state.load_user(user_id).await {
    Ok(u) => u,
    Err(e) => {
      error!(target: "vault_bot", %user_id, error = %e, "Failed to load user record");
      return TERMINAL_MALFUNCTION.into();
    }
  };

  let command = Command::parse(&text, user.adventure.pending().is_some());
  info!(target: "vault_bot", %user_id, command = command_name(&command), "Dispatching utterance");

  match command {
    Command::AdventureStart => {
      let reply = AdventureSession::new(&mut user, &state.quizzes, &state.rules).start();
      save_then(state, &user, reply).await
    }

    Command::AdventureQuiz(subject) => {
      if !user.stats.is_allocated() {
        return NEEDS_SPECIAL.into();
      }
      let reply = AdventureSession::new(&mut user, &state.quizzes, &state.rules)
        .request_quiz(subject)
        .await;
      save_then(state, &user, reply).await
    }

    Command::Answer(answer) => {
      let outcome = AdventureSession::new(&mut user, &state.quizzes, &state.rules).submit_answer(answer);
      save_then(state, &user, outcome.narrate()).await
    }

    Command::Reset => {
      AdventureSession::new(&mut user, &state.quizzes, &state.rules).reset();
      match state.store.delete(user_id).await {
        Ok(()) => "🔄 Your VaultDweller profile has been reset. Run `/start` to set your SPECIAL stats anew!".into(),
        Err(e) => {
          // At least leave the user out of any half-finished adventure.
          error!(target: "vault_bot", %user_id, error = %e, "Failed to delete user record");
          save_then(state, &user, TERMINAL_MALFUNCTION.to_string()).await
        }
      }
    }

    Command::Start => {
      if user.stats.is_allocated() {
        return "You've already set up your SPECIAL stats.".into();
      }
      format!(
        "Welcome to VaultDwellersBot! You have **{budget}** points to assign across your SPECIAL stats.\n\
         Reply with 7 comma-separated integers (must sum to {budget}) in order:\n\
         `{names}`\n\
         Example: `5,5,5,5,5,2,1`",
        budget = state.rules.stat_budget,
        names = STAT_NAMES.join(", "),
      )
    }

    Command::Allocate(values) => match user.allocate_stats(&values, state.rules.stat_budget) {
      Ok(()) => {
        let reply = format!(
          "SPECIAL set to {}!\nYou can now send `/stats` or embark on an adventure with `/adventure start`.",
          user.stats.describe()
        );
        save_then(state, &user, reply).await
      }
      Err(e) => {
        warn!(target: "vault_bot", %user_id, error = %e, "Rejected SPECIAL allocation");
        format!("❌ That doesn't sum to {}. Try again.", state.rules.stat_budget)
      }
    },

    Command::Stats => profile_text(&user),

    Command::Chat(message) => chat(state, &mut user, message).await,
  }
}

/// Plain chat: forward to the LLM with the stat block embedded, award chat xp on a reply.
async fn chat(state: &AppState, user: &mut UserRecord, message: &str) -> String {
  if !user.stats.is_allocated() {
    return NEEDS_SPECIAL.into();
  }
  let Some(llm) = &state.llm else {
    return "📻 The terminal is offline. Try `/adventure quiz <subject>` while the uplink is down.".into();
  };

  let special = user.stats.describe();
  let prompt = fill_template(&state.prompts.chat, &[("special", &special), ("text", message)]);
  let answer = match llm.complete(&prompt).await {
    Ok(a) if !a.trim().is_empty() => a.trim().to_string(),
    Ok(_) => return "📻 Only static on the wire. Try again.".into(),
    Err(e) => {
      warn!(target: "vault_bot", user_id = %user.user_id, error = %e, "Chat completion failed");
      return "📻 Only static on the wire. Try again.".into();
    }
  };

  user.record_history(message, &answer, state.rules.history_limit);
  let award = ledger::award(user, state.rules.chat_xp, &state.rules.levels);
  let mut reply = format!("💠 You earned **{} XP**.\n\n{}", award.granted, answer);
  if let Some(perk) = &award.perk {
    reply.push_str(&format!(
      "\n\n🎉 **Level Up!** You're now Level {} and unlocked **{}**.",
      award.new_level, perk
    ));
  }
  save_then(state, user, reply).await
}

pub fn profile_text(user: &UserRecord) -> String {
  let stats = STAT_NAMES
    .iter()
    .zip(user.stats.values())
    .map(|(name, v)| format!("  – {name}: {v}"))
    .collect::<Vec<_>>()
    .join("\n");
  let perks = if user.perks.is_empty() { "None".to_string() } else { user.perks.join(", ") };
  format!(
    "**Vault Dweller Profile**\n• XP: {}   Level: {}\n• SPECIAL:\n{}\n• Perks: {}",
    user.xp, user.level, stats, perks
  )
}

async fn save_then(state: &AppState, user: &UserRecord, reply: String) -> String {
  match state.store.save(user).await {
    Ok(()) => reply,
    Err(e) => {
      error!(target: "vault_bot", user_id = %user.user_id, error = %e, "Failed to save user record");
      TERMINAL_MALFUNCTION.into()
    }
  }
}

fn command_name(c: &Command<'_>) -> &'static str {
  match c {
    Command::AdventureStart => "adventure_start",
    Command::AdventureQuiz(_) => "adventure_quiz",
    Command::Answer(_) => "answer",
    Command::Reset => "reset",
    Command::Start => "start",
    Command::Allocate(_) => "allocate",
    Command::Stats => "stats",
    Command::Chat(_) => "chat",
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::config::AgentConfig;
  use crate::llm::testing::ScriptedLlm;
  use crate::llm::TextCompletion;
  use crate::store::{MemoryUserStore, UserStore};

  fn app(llm: Option<Arc<dyn TextCompletion>>) -> AppState {
    AppState::new(&AgentConfig::default(), Arc::new(MemoryUserStore::default()), llm)
  }

  #[test]
  fn command_parsing() {
    assert_eq!(Command::parse("/Adventure Start", false), Command::AdventureStart);
    assert_eq!(Command::parse("/adventure quiz", false), Command::AdventureQuiz(None));
    assert_eq!(
      Command::parse("/adventure quiz  Python Syntax ", true),
      Command::AdventureQuiz(Some("Python Syntax"))
    );
    assert_eq!(Command::parse("/stats", true), Command::Answer("/stats"));
    assert_eq!(Command::parse("/stats", false), Command::Stats);
    assert_eq!(Command::parse("/reset", false), Command::Reset);
    assert_eq!(Command::parse("/start", false), Command::Start);
    assert_eq!(
      Command::parse("5,5,5,5,5,2,1", false),
      Command::Allocate(vec![5, 5, 5, 5, 5, 2, 1])
    );
    assert_eq!(Command::parse("5, 5, 5, 5, 5, 2, 2", false), Command::Allocate(vec![5, 5, 5, 5, 5, 2, 2]));
    assert_eq!(Command::parse("5,5,5", false), Command::Chat("5,5,5"));
    assert_eq!(Command::parse("5,5,5,5,5,2,-1", false), Command::Chat("5,5,5,5,5,2,-1"));
    assert_eq!(Command::parse("hello there", false), Command::Chat("hello there"));
  }

  #[tokio::test]
  async fn allocation_then_quiz_then_answer() {
    let state = app(None);
    let reply = handle_utterance(&state, "7", "<@1> 5,5,5,5,5,2,2").await;
    assert!(reply.contains("doesn't sum to 28"));
    assert!(!state.store.load("7").await.unwrap().stats.is_allocated());
    let reply = handle_utterance(&state, "7", "0,0,0,0,4294967295,29,0").await;
    assert!(reply.contains("doesn't sum to 28"));
    assert!(!state.store.load("7").await.unwrap().stats.is_allocated());

    let reply = handle_utterance(&state, "7", "5,5,5,5,5,2,1").await;
    assert!(reply.starts_with("SPECIAL set to"));

    let reply = handle_utterance(&state, "7", "/adventure quiz german basics").await;
    assert!(reply.contains("Skill check"));
    let pending = state.store.load("7").await.unwrap().adventure.pending().cloned().unwrap();
    let answer = pending.canonical_answer().unwrap().to_string();

    let reply = handle_utterance(&state, "7", &answer).await;
    assert!(reply.contains("passed"));
    let user = state.store.load("7").await.unwrap();
    assert_eq!(user.xp, 11);
    assert!(user.adventure.pending().is_none());
    assert_eq!(user.adventure.step, 2);
  }

  #[tokio::test]
  async fn quiz_requires_special() {
    let state = app(None);
    let reply = handle_utterance(&state, "8", "/adventure quiz").await;
    assert_eq!(reply, NEEDS_SPECIAL);
  }

  #[tokio::test]
  async fn chat_awards_xp_and_records_history() {
    let llm = Arc::new(ScriptedLlm::replying(&["War never changes."]));
    let state = app(Some(llm.clone()));
    handle_utterance(&state, "9", "1,1,1,1,9,9,6").await;

    let reply = handle_utterance(&state, "9", "tell me about war").await;
    assert!(reply.starts_with("💠 You earned **4 XP**."));
    assert!(reply.contains("War never changes."));
    assert!(llm.prompts.lock().unwrap()[0].contains("Intelligence: 9"));

    let user = state.store.load("9").await.unwrap();
    assert_eq!(user.xp, 4);
    assert_eq!(user.history.len(), 1);
    assert_eq!(user.history[0].prompt, "tell me about war");
  }

  #[tokio::test]
  async fn chat_level_up_appends_perk() {
    let state = app(Some(Arc::new(ScriptedLlm::replying(&["ok"]))));
    handle_utterance(&state, "10", "4,4,4,4,4,4,4").await;
    let mut user = state.store.load("10").await.unwrap();
    user.xp = 99;
    state.store.save(&user).await.unwrap();

    let reply = handle_utterance(&state, "10", "hi").await;
    assert!(reply.contains("Level Up!"));
    let user = state.store.load("10").await.unwrap();
    assert_eq!(user.level, 2);
    assert_eq!(user.perks, vec!["Level 2 Reward".to_string()]);
  }

  #[tokio::test]
  async fn stale_level_is_rederived_before_dispatch() {
    let state = app(Some(Arc::new(ScriptedLlm::replying(&["ok"]))));
    handle_utterance(&state, "14", "4,4,4,4,4,4,4").await;
    let mut user = state.store.load("14").await.unwrap();
    user.xp = 5_000;
    state.store.save(&user).await.unwrap();

    assert!(handle_utterance(&state, "14", "/stats").await.contains("Level: 10"));
    let reply = handle_utterance(&state, "14", "hi").await;
    assert!(!reply.contains("Level Up!"));
    let user = state.store.load("14").await.unwrap();
    assert_eq!(user.level, 10);
    assert!(user.perks.is_empty());
  }

  #[tokio::test]
  async fn chat_without_llm_awards_nothing() {
    let state = app(None);
    handle_utterance(&state, "11", "4,4,4,4,4,4,4").await;
    let reply = handle_utterance(&state, "11", "anyone out there?").await;
    assert!(reply.contains("offline"));
    assert_eq!(state.store.load("11").await.unwrap().xp, 0);
  }

  #[tokio::test]
  async fn reset_wipes_profile_and_mentions_only_is_silent() {
    let state = app(None);
    handle_utterance(&state, "12", "4,4,4,4,4,4,4").await;
    assert_eq!(handle_utterance(&state, "12", "<@555>").await, "");

    let reply = handle_utterance(&state, "12", "/reset").await;
    assert!(reply.contains("reset"));
    assert!(!state.store.load("12").await.unwrap().stats.is_allocated());
  }

  #[tokio::test]
  async fn stats_and_start_texts() {
    let state = app(None);
    assert!(handle_utterance(&state, "13", "/start").await.contains("**28** points"));
    handle_utterance(&state, "13", "4,4,4,4,4,4,4").await;
    assert!(handle_utterance(&state, "13", "/start").await.contains("already set up"));

    let stats = handle_utterance(&state, "13", "/stats").await;
    assert!(stats.contains("XP: 0   Level: 1"));
    assert!(stats.contains("– Luck: 4"));
    assert!(stats.contains("Perks: None"));
  }
}
