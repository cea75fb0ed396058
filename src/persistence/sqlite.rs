use crate::error::{CopilotError, Result};
use crate::persistence::KeyValueStorage;
use anyhow::Context;
use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Environment variable overriding the database location
pub const STORAGE_PATH_ENV: &str = "COPILOT_STORAGE_PATH";

/// Key/value storage in a single SQLite table
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStorage {
    db_path: PathBuf,
}

impl SqliteKeyValueStorage {
    /// Create a storage instance in the user's data directory
    ///
    /// `COPILOT_STORAGE_PATH` overrides the location.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var(STORAGE_PATH_ENV) {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "copilot", "copilot-sidebar")
            .ok_or_else(|| CopilotError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| CopilotError::Storage(e.to_string()))?;

        Self::new_with_path(data_dir.join("state.db"))
    }

    /// Create a storage instance backed by a specific database file
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_sidebar::persistence::SqliteKeyValueStorage;
    ///
    /// let dir = std::env::temp_dir().join("copilot-sidebar-doc");
    /// let storage = SqliteKeyValueStorage::new_with_path(dir.join("state.db")).unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| CopilotError::Storage(e.to_string()))?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn init(&self) -> Result<()> {
        let conn = open(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| CopilotError::Storage(e.to_string()))?;
        Ok(())
    }

    fn get_blocking(db_path: &Path, key: &str) -> Result<Option<String>> {
        let conn = open(db_path)?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("Failed to query key")
            .map_err(|e| CopilotError::Storage(e.to_string()))?;
        Ok(value)
    }

    fn set_blocking(db_path: &Path, key: &str, value: &str) -> Result<()> {
        let conn = open(db_path)?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .context("Failed to write key")
        .map_err(|e| CopilotError::Storage(e.to_string()))?;
        Ok(())
    }

    fn remove_blocking(db_path: &Path, key: &str) -> Result<()> {
        let conn = open(db_path)?;
        conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])
            .context("Failed to delete key")
            .map_err(|e| CopilotError::Storage(e.to_string()))?;
        Ok(())
    }
}

fn open(db_path: &Path) -> Result<Connection> {
    Ok(Connection::open(db_path)
        .context("Failed to open database")
        .map_err(|e| CopilotError::Storage(e.to_string()))?)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CopilotError::Storage(format!("Storage task failed: {}", e)))?
}

#[async_trait::async_trait]
impl KeyValueStorage for SqliteKeyValueStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        blocking(move || Self::get_blocking(&db_path, &key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        let value = value.to_string();
        blocking(move || Self::set_blocking(&db_path, &key, &value)).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        blocking(move || Self::remove_blocking(&db_path, &key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    fn create_test_storage() -> (SqliteKeyValueStorage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let storage = SqliteKeyValueStorage::new_with_path(dir.path().join("state.db")).unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let (storage, _dir) = create_test_storage();
        assert_eq!(storage.get("k").await.unwrap(), None);

        storage.set("k", "v1").await.unwrap();
        storage.set("k", "v2").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), Some("v2".to_string()));

        storage.remove("k").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), None);
        storage.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        SqliteKeyValueStorage::new_with_path(&path)
            .unwrap()
            .set("k", "persisted")
            .await
            .unwrap();

        let reopened = SqliteKeyValueStorage::new_with_path(&path).unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some("persisted".to_string()));
    }

    #[test]
    #[serial]
    fn test_env_override_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("override.db");
        std::env::set_var(STORAGE_PATH_ENV, &path);
        let storage = SqliteKeyValueStorage::new().unwrap();
        assert_eq!(storage.path(), path.as_path());
        std::env::remove_var(STORAGE_PATH_ENV);
    }
}
