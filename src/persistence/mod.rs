//! Durable chat state
//!
//! The storage collaborator is a generic async key/value store
//! ([`KeyValueStorage`]). [`ChatStateRepository`] keeps the whole
//! [`PersistedChatState`] blob under one namespaced key. Runtime-only state
//! never reaches storage: the blob is produced by
//! [`crate::session::SessionStore::to_persisted`].

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use crate::error::{CopilotError, Result};
use crate::session::PersistedChatState;

pub use memory::MemoryStorage;
pub use sqlite::SqliteKeyValueStorage;

/// Generic async key/value storage
#[async_trait::async_trait]
pub trait KeyValueStorage: Send + Sync + std::fmt::Debug {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value; deleting a missing key succeeds
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Loads and saves the chat state blob
#[derive(Debug, Clone)]
pub struct ChatStateRepository {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl ChatStateRepository {
    /// Create a repository storing its blob under `key`
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Key the blob is stored under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored blob, if any
    ///
    /// # Errors
    ///
    /// Returns [`CopilotError::Storage`] if the blob cannot be read or is
    /// not valid chat state.
    pub async fn load(&self) -> Result<Option<PersistedChatState>> {
        let Some(raw) = self.storage.get(&self.key).await? else {
            return Ok(None);
        };
        let state = serde_json::from_str(&raw).map_err(|e| {
            CopilotError::Storage(format!("Failed to parse stored chat state: {}", e))
        })?;
        Ok(Some(state))
    }

    /// Save the blob
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the storage write fails.
    pub async fn save(&self, state: &PersistedChatState) -> Result<()> {
        let raw = serde_json::to_string(state)?;
        self.storage.set(&self.key, &raw).await?;
        tracing::debug!(
            key = %self.key,
            sessions = state.sessions.len(),
            "Saved chat state"
        );
        Ok(())
    }

    /// Delete the blob
    pub async fn clear(&self) -> Result<()> {
        self.storage.remove(&self.key).await
    }
}
