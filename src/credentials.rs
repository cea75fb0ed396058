//! Locally stored credential for direct provider calls
//!
//! The API key lives in the system keyring. `COPILOT_GEMINI_API_KEY` takes
//! precedence when set, which keeps CI and containers free of a keyring.

use crate::error::Result;

/// Environment variable overriding the stored key
pub const API_KEY_ENV: &str = "COPILOT_GEMINI_API_KEY";

/// Keyring-backed API key store
#[derive(Debug, Clone)]
pub struct CredentialStore {
    keyring_service: String,
    keyring_user: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new("copilot-sidebar", "gemini_api_key")
    }
}

impl CredentialStore {
    /// Create a store for a specific keyring entry
    pub fn new(service: &str, user: &str) -> Self {
        Self {
            keyring_service: service.to_string(),
            keyring_user: user.to_string(),
        }
    }

    /// Look up the API key
    ///
    /// Returns `Ok(None)` when nothing usable is stored. A keyring that is
    /// unavailable on this platform is treated the same way.
    ///
    /// # Errors
    ///
    /// Returns an error only when the keyring reports an unexpected failure
    /// while reading an existing entry.
    pub fn api_key(&self) -> Result<Option<String>> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if has_valid_api_key(Some(&key)) {
                return Ok(Some(key.trim().to_string()));
            }
        }

        let entry = match keyring::Entry::new(&self.keyring_service, &self.keyring_user) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Keyring not available: {}", e);
                return Ok(None);
            }
        };

        match entry.get_password() {
            Ok(key) if has_valid_api_key(Some(&key)) => Ok(Some(key.trim().to_string())),
            Ok(_) => Ok(None),
            Err(keyring::Error::NoEntry) | Err(keyring::Error::PlatformFailure(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Save the API key in the keyring
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring rejects the write.
    pub fn store_api_key(&self, key: &str) -> Result<()> {
        let entry = keyring::Entry::new(&self.keyring_service, &self.keyring_user)?;
        entry.set_password(key.trim())?;
        tracing::info!("Stored API key in keyring");
        Ok(())
    }

    /// Forget the stored key (best-effort)
    pub fn clear(&self) -> Result<()> {
        match keyring::Entry::new(&self.keyring_service, &self.keyring_user) {
            Ok(entry) => match entry.delete_password() {
                Ok(()) | Err(keyring::Error::NoEntry) => {
                    tracing::info!("Cleared API key from keyring");
                }
                Err(e) => tracing::warn!("Failed to clear API key: {}", e),
            },
            Err(e) => tracing::warn!("Keyring not available while clearing API key: {}", e),
        }
        Ok(())
    }
}

/// True for a present, non-blank key
pub fn has_valid_api_key(key: Option<&str>) -> bool {
    key.map(|k| !k.trim().is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_has_valid_api_key() {
        assert!(!has_valid_api_key(None));
        assert!(!has_valid_api_key(Some("   ")));
        assert!(has_valid_api_key(Some("abc")));
    }

    #[test]
    #[serial]
    fn test_env_override_wins() {
        std::env::set_var(API_KEY_ENV, "  from-env  ");
        let store = CredentialStore::new("copilot-sidebar-test", "unused");
        assert_eq!(store.api_key().unwrap(), Some("from-env".to_string()));
        std::env::remove_var(API_KEY_ENV);
    }
}
