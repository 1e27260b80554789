use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::interview::machine::SessionPhase;
use crate::interview::runtime::SessionHandle;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("user {0} already has a live interview")]
    UserBusy(String),
}

struct Entry {
    user_id: String,
    handle: SessionHandle,
}

/// Live interviews by id. At most one per user, which keeps each user's
/// tracker single-session across requests. Ended interviews stay readable
/// until the next insert sweeps them.
#[derive(Default)]
pub struct InterviewRegistry {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl InterviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: &str, handle: SessionHandle) -> Result<Uuid, RegistryError> {
        let mut entries = self.entries.write().await;
        entries.retain(|id, entry| {
            let live = !entry.handle.is_closed()
                && entry.handle.snapshot().phase != SessionPhase::Ended;
            if !live {
                info!("Dropping finished interview {id} for {}", entry.user_id);
            }
            live
        });
        if entries.values().any(|entry| entry.user_id == user_id) {
            return Err(RegistryError::UserBusy(user_id.to_string()));
        }

        let id = Uuid::new_v4();
        entries.insert(
            id,
            Entry {
                user_id: user_id.to_string(),
                handle,
            },
        );
        info!("Registered interview {id} for {user_id}");
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.entries
            .read()
            .await
            .get(&id)
            .map(|entry| entry.handle.clone())
    }

    /// Removing the last handle shuts the interview down.
    pub async fn remove(&self, id: Uuid) -> Option<SessionHandle> {
        let removed = self.entries.write().await.remove(&id);
        if let Some(entry) = &removed {
            info!("Removed interview {id} for {}", entry.user_id);
        }
        removed.map(|entry| entry.handle)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
