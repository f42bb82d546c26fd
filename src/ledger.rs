//! XP and level bookkeeping on a loaded user record. Pure; never performs I/O.

use thiserror::Error;
use tracing::info;

use crate::domain::UserRecord;
use crate::seeds::seed_level_thresholds;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LevelTableError {
  #[error("level table is empty")]
  Empty,
  #[error("level table must start at level 1 with 0 xp")]
  BadStart,
  #[error("level table must be strictly increasing (at level {0})")]
  NotIncreasing(u32),
}

/// Ordered `level -> minimum xp` thresholds, strictly increasing in both columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelTable {
  thresholds: Vec<(u32, u64)>,
}

impl Default for LevelTable {
  fn default() -> Self {
    Self { thresholds: seed_level_thresholds() }
  }
}

impl LevelTable {
  pub fn new(thresholds: Vec<(u32, u64)>) -> Result<Self, LevelTableError> {
    match thresholds.first() {
      None => return Err(LevelTableError::Empty),
      Some(&(1, 0)) => {}
      Some(_) => return Err(LevelTableError::BadStart),
    }
    for pair in thresholds.windows(2) {
      let ((l0, x0), (l1, x1)) = (pair[0], pair[1]);
      if l1 <= l0 || x1 <= x0 {
        return Err(LevelTableError::NotIncreasing(l1));
      }
    }
    Ok(Self { thresholds })
  }

  /// Highest level whose threshold is at most `xp`.
  pub fn level_for(&self, xp: u64) -> u32 {
    self.thresholds
      .iter()
      .take_while(|(_, min_xp)| *min_xp <= xp)
      .last()
      .map(|(level, _)| *level)
      .unwrap_or(1)
  }

  pub fn max_level(&self) -> u32 {
    self.thresholds.last().map(|(l, _)| *l).unwrap_or(1)
  }
}

/// Result of one XP award.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Award {
  pub granted: u64,
  pub old_level: u32,
  pub new_level: u32,
  /// Perk unlocked by this award, if the level went up.
  pub perk: Option<String>,
}

impl Award {
  pub fn leveled_up(&self) -> bool {
    self.new_level > self.old_level
  }
}

pub fn level_perk(level: u32) -> String {
  format!("Level {level} Reward")
}

/// Re-derive `level` from `xp`; stored levels go stale when the table changes.
pub fn sync_level(user: &mut UserRecord, table: &LevelTable) {
  user.level = table.level_for(user.xp);
}

/// Grant `base + intelligence / 3` xp, recompute the level, and grant a perk on level-up.
pub fn award(user: &mut UserRecord, base: u64, table: &LevelTable) -> Award {
  let bonus = u64::from(user.stats.intelligence / 3);
  let granted = base + bonus;
  let old_level = table.level_for(user.xp);

  user.xp = user.xp.saturating_add(granted);
  let new_level = table.level_for(user.xp);
  user.level = new_level;

  let mut award = Award { granted, old_level, new_level, perk: None };
  if award.leveled_up() {
    let perk = level_perk(new_level);
    info!(target: "ledger", user = %user.user_id, old_level, new_level, %perk, "Level up");
    user.perks.push(perk.clone());
    award.perk = Some(perk);
  }
  award
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::StatBlock;

  fn dweller(intelligence: u32) -> UserRecord {
    let mut u = UserRecord::new("u1");
    u.stats = StatBlock { intelligence, ..StatBlock::default() };
    u
  }

  #[test]
  fn table_validation() {
    assert!(LevelTable::new(vec![(1, 0), (2, 10)]).is_ok());
    assert_eq!(LevelTable::new(vec![]), Err(LevelTableError::Empty));
    assert_eq!(LevelTable::new(vec![(2, 0)]), Err(LevelTableError::BadStart));
    assert_eq!(LevelTable::new(vec![(1, 5)]), Err(LevelTableError::BadStart));
    assert_eq!(
      LevelTable::new(vec![(1, 0), (2, 100), (3, 100)]),
      Err(LevelTableError::NotIncreasing(3))
    );
  }

  #[test]
  fn level_for_picks_highest_reached_threshold() {
    let t = LevelTable::default();
    assert_eq!(t.level_for(0), 1);
    assert_eq!(t.level_for(99), 1);
    assert_eq!(t.level_for(100), 2);
    assert_eq!(t.level_for(299), 2);
    assert_eq!(t.level_for(19_000), 20);
    assert_eq!(t.level_for(u64::MAX), 20);
    assert_eq!(t.max_level(), 20);
  }

  #[test]
  fn intelligence_bonus_uses_integer_division() {
    let t = LevelTable::default();
    let mut u = dweller(8);
    let a = award(&mut u, 1, &t);
    assert_eq!(a.granted, 3);
    assert_eq!(u.xp, 3);
    assert_eq!((a.old_level, a.new_level), (1, 1));
    assert!(a.perk.is_none());
  }

  #[test]
  fn unallocated_stats_give_no_bonus() {
    let mut u = UserRecord::new("u1");
    let a = award(&mut u, 10, &LevelTable::default());
    assert_eq!(a.granted, 10);
  }

  #[test]
  fn level_up_grants_one_perk() {
    let t = LevelTable::default();
    let mut u = dweller(0);
    u.xp = 95;
    let a = award(&mut u, 10, &t);
    assert!(a.leveled_up());
    assert_eq!(a.new_level, 2);
    assert_eq!(u.perks, vec!["Level 2 Reward".to_string()]);

    // Skipping several levels still appends exactly one perk.
    let a = award(&mut u, 1_000, &t);
    assert_eq!(a.new_level, 5);
    assert_eq!(u.perks.len(), 2);
    assert_eq!(u.perks[1], "Level 5 Reward");
  }

  #[test]
  fn stale_stored_level_is_rederived() {
    let t = LevelTable::default();
    let mut u = dweller(0);
    u.xp = 5_000;
    sync_level(&mut u, &t);
    assert_eq!(u.level, 10);

    // A record whose stored level lags its xp gets no back-dated perks.
    u.level = 1;
    let a = award(&mut u, 1, &t);
    assert_eq!((a.old_level, a.new_level), (10, 10));
    assert!(a.perk.is_none());
    assert!(u.perks.is_empty());
    assert_eq!(u.level, 10);
  }

  #[test]
  fn levels_are_monotonic_and_derived_from_xp() {
    let t = LevelTable::default();
    let mut u = dweller(5);
    let mut last = u.level;
    for base in [0u64, 1, 7, 50, 0, 300, 2, 999, 4_000, 13] {
      award(&mut u, base, &t);
      assert!(u.level >= last);
      assert_eq!(u.level, t.level_for(u.xp));
      last = u.level;
    }
  }
}
