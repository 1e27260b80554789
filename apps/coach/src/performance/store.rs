//! Profile persistence port.
//!
//! One JSON document per user: `{"currentLevel": ..., "history": [...]}`.
//! `AppState` carries an `Arc<dyn ProfileStore>`, chosen at startup from config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::leveling::LiveLevel;
use crate::performance::tracker::SessionHistoryEntry;

const REDIS_KEY_PREFIX: &str = "coach:profile:";

/// Longest escaped stem used verbatim. Leaves room for `.json.tmp` under
/// the usual 255-byte filename limit.
const MAX_STEM_LEN: usize = 200;
/// Escaped prefix kept in front of the digest for long ids.
const HASHED_PREFIX_LEN: usize = 120;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Durable per-user coaching state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProfile {
    pub current_level: LiveLevel,
    #[serde(default)]
    pub history: Vec<SessionHistoryEntry>,
}

impl Default for StoredProfile {
    fn default() -> Self {
        Self {
            current_level: LiveLevel::Simple,
            history: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` when the user has never been persisted.
    async fn load(&self, user_id: &str) -> Result<Option<StoredProfile>, StoreError>;

    async fn save(&self, user_id: &str, profile: &StoredProfile) -> Result<(), StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

/// Keeps the serialized JSON so behaviour matches the durable backends.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, String>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn raw(&self, user_id: &str) -> Option<String> {
        self.profiles.read().await.get(user_id).cloned()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load(&self, user_id: &str) -> Result<Option<StoredProfile>, StoreError> {
        match self.profiles.read().await.get(user_id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user_id: &str, profile: &StoredProfile) -> Result<(), StoreError> {
        let json = serde_json::to_string(profile)?;
        self.profiles.write().await.insert(user_id.to_string(), json);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JSON files
// ────────────────────────────────────────────────────────────────────────────

/// One pretty-printed JSON file per user under `dir`.
pub struct JsonFileProfileStore {
    dir: PathBuf,
}

impl JsonFileProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(user_id)))
    }
}

#[async_trait]
impl ProfileStore for JsonFileProfileStore {
    async fn load(&self, user_id: &str) -> Result<Option<StoredProfile>, StoreError> {
        let path = self.path_for(user_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, user_id: &str, profile: &StoredProfile) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(user_id);
        let json = serde_json::to_string_pretty(profile)?;

        // Write-then-rename so a crash never leaves a truncated profile behind.
        let tmp = temp_path(&path);
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Saved profile for user {user_id} to {}", path.display());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Maps an opaque user id onto a safe, collision-free file stem.
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes `%XX`.
fn escape_user_id(user_id: &str) -> String {
    let mut out = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Escaped id when it fits, otherwise an escaped prefix plus `~` and the
/// SHA-256 of the full id. Escaping never emits `~`.
fn file_stem(user_id: &str) -> String {
    let escaped = escape_user_id(user_id);
    if escaped.len() <= MAX_STEM_LEN {
        return escaped;
    }
    // Escaped output is ASCII, so any byte offset is a char boundary.
    format!(
        "{}~{:x}",
        &escaped[..HASHED_PREFIX_LEN],
        Sha256::digest(user_id.as_bytes())
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

pub struct RedisProfileStore {
    client: redis::Client,
}

impl RedisProfileStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn key(user_id: &str) -> String {
        format!("{REDIS_KEY_PREFIX}{user_id}")
    }
}

#[async_trait]
impl ProfileStore for RedisProfileStore {
    async fn load(&self, user_id: &str) -> Result<Option<StoredProfile>, StoreError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let json: Option<String> = con.get(Self::key(user_id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user_id: &str, profile: &StoredProfile) -> Result<(), StoreError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(profile)?;
        con.set::<_, _, ()>(Self::key(user_id), json).await?;
        Ok(())
    }
}
