//! Persistent user records: get-or-create, full-record replace, delete.

use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::domain::UserRecord;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Corrupt user record {user_id}: {source}")]
  Corrupt {
    user_id: String,
    #[source]
    source: serde_json::Error,
  },
  #[error("Record file for {requested} holds user {found}")]
  Mismatch { requested: String, found: String },
  #[error("Serialization error: {0}")]
  Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
  /// Existing record, or a zeroed one that is persisted immediately.
  async fn load(&self, user_id: &str) -> Result<UserRecord, StoreError>;
  async fn save(&self, user: &UserRecord) -> Result<(), StoreError>;
  async fn delete(&self, user_id: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryUserStore {
  users: RwLock<HashMap<String, UserRecord>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
  async fn load(&self, user_id: &str) -> Result<UserRecord, StoreError> {
    if let Some(u) = self.users.read().await.get(user_id) {
      return Ok(u.clone());
    }
    let mut users = self.users.write().await;
    Ok(users
      .entry(user_id.to_string())
      .or_insert_with(|| UserRecord::new(user_id))
      .clone())
  }

  async fn save(&self, user: &UserRecord) -> Result<(), StoreError> {
    self.users.write().await.insert(user.user_id.clone(), user.clone());
    Ok(())
  }

  async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
    self.users.write().await.remove(user_id);
    Ok(())
  }
}

/// One pretty-printed `<user_id>.json` per user under a directory.
pub struct JsonFileUserStore {
  dir: PathBuf,
}

impl JsonFileUserStore {
  pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let dir = dir.into();
    tokio::fs::create_dir_all(&dir).await?;
    info!(target: "vault_bot", dir = %dir.display(), "Using JSON file user store");
    Ok(Self { dir })
  }

  fn path_for(&self, user_id: &str) -> PathBuf {
    self.dir.join(format!("{}.json", safe_file_stem(user_id)))
  }
}

#[async_trait]
impl UserStore for JsonFileUserStore {
  #[instrument(level = "debug", skip(self))]
  async fn load(&self, user_id: &str) -> Result<UserRecord, StoreError> {
    let path = self.path_for(user_id);
    match tokio::fs::read(&path).await {
      Ok(bytes) => {
        let user: UserRecord = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
          user_id: user_id.to_string(),
          source,
        })?;
        if user.user_id != user_id {
          return Err(StoreError::Mismatch { requested: user_id.to_string(), found: user.user_id });
        }
        Ok(user)
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(target: "vault_bot", %user_id, "Creating new user record");
        let user = UserRecord::new(user_id);
        self.save(&user).await?;
        Ok(user)
      }
      Err(e) => Err(e.into()),
    }
  }

  #[instrument(level = "debug", skip(self, user), fields(user_id = %user.user_id))]
  async fn save(&self, user: &UserRecord) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(user)?;
    let path = self.path_for(&user.user_id);
    // Write-then-rename so a crash never leaves a half-written record.
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
    match tokio::fs::remove_file(self.path_for(user_id)).await {
      Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
      _ => Ok(()),
    }
  }
}

/// Filesystem-safe and one-to-one: ASCII alphanumerics and '-' pass,
/// every other byte becomes `_XX` (uppercase hex).
fn safe_file_stem(user_id: &str) -> String {
  if user_id.is_empty() {
    return "_".into();
  }
  let mut stem = String::with_capacity(user_id.len());
  for b in user_id.bytes() {
    if b.is_ascii_alphanumeric() || b == b'-' {
      stem.push(char::from(b));
    } else {
      stem.push_str(&format!("_{b:02X}"));
    }
  }
  stem
}
