//! Configuration management for the copilot sidebar
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{CopilotError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
///
/// Every section is optional in the YAML file; missing sections fall back
/// to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend proxy settings
    #[serde(default)]
    pub backend: BackendConfig,
    /// Direct provider ("frontend-only") settings
    #[serde(default)]
    pub direct: DirectConfig,
    /// Chat defaults and model catalogue
    #[serde(default)]
    pub chat: ChatConfig,
    /// Chat state persistence
    #[serde(default)]
    pub storage: StorageConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the streaming chat backend
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Upper bound for the health check request (seconds)
    #[serde(default = "default_health_timeout")]
    pub health_timeout_seconds: u64,

    /// Ask the backend to replay a canned stream instead of calling a model
    #[serde(default)]
    pub use_fake_stream: bool,
}

fn default_backend_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_health_timeout() -> u64 {
    5
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            health_timeout_seconds: default_health_timeout(),
            use_fake_stream: false,
        }
    }
}

/// Direct provider configuration
///
/// When `frontend_only_mode` is set, providers whose name contains
/// `provider_family` are called directly instead of through the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectConfig {
    /// Bypass the backend for directly-callable providers
    #[serde(default)]
    pub frontend_only_mode: bool,

    /// Substring identifying directly-callable providers
    #[serde(default = "default_provider_family")]
    pub provider_family: String,

    /// Base URL of the provider API (useful for tests and local mocks)
    #[serde(default = "default_direct_api_base")]
    pub api_base: String,

    /// Model used for direct calls
    #[serde(default = "default_direct_model")]
    pub model: String,
}

fn default_provider_family() -> String {
    "gemini".to_string()
}

fn default_direct_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_direct_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            frontend_only_mode: false,
            provider_family: default_provider_family(),
            api_base: default_direct_api_base(),
            model: default_direct_model(),
        }
    }
}

impl DirectConfig {
    /// Returns true when requests for `provider` bypass the backend
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_sidebar::config::DirectConfig;
    ///
    /// let mut direct = DirectConfig::default();
    /// assert!(!direct.routes_directly("gemini-2.5-flash"));
    /// direct.frontend_only_mode = true;
    /// assert!(direct.routes_directly("gemini-2.5-flash"));
    /// assert!(!direct.routes_directly("gpt-4.1-nano"));
    /// ```
    pub fn routes_directly(&self, provider: &str) -> bool {
        self.frontend_only_mode && provider.contains(&self.provider_family)
    }
}

/// Chat defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Provider used for new sessions
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Models offered for turbo selection
    #[serde(default = "default_available_models")]
    pub available_models: Vec<String>,
}

fn default_provider() -> String {
    crate::session::DEFAULT_PROVIDER.to_string()
}

fn default_available_models() -> Vec<String> {
    vec![
        "gemini-2.5-flash".to_string(),
        "gemini-2.5-pro".to_string(),
        "gpt-4.1-nano".to_string(),
        "gpt-4o-mini".to_string(),
    ]
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            available_models: default_available_models(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; the platform data directory is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Prefix of the key the chat state is stored under
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "copilot-sidebar".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            namespace: default_namespace(),
        }
    }
}

impl StorageConfig {
    /// Key under which the chat state blob is persisted
    pub fn chat_state_key(&self) -> String {
        format!("{}:chat-store", self.namespace)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CopilotError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| CopilotError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("COPILOT_BACKEND_URL") {
            self.backend.base_url = url;
        }

        if let Ok(timeout) = std::env::var("COPILOT_HEALTH_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.backend.health_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid COPILOT_HEALTH_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(frontend_only) = std::env::var("COPILOT_FRONTEND_ONLY") {
            match frontend_only.parse::<bool>() {
                Ok(v) => {
                    self.direct.frontend_only_mode = v;
                    tracing::debug!(frontend_only = v, "Env override: COPILOT_FRONTEND_ONLY");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for COPILOT_FRONTEND_ONLY: {}", frontend_only);
                }
            }
        }

        if let Ok(model) = std::env::var("COPILOT_DIRECT_MODEL") {
            self.direct.model = model;
        }

        if let Ok(api_base) = std::env::var("COPILOT_DIRECT_API_BASE") {
            self.direct.api_base = api_base;
        }

        if let Ok(provider) = std::env::var("COPILOT_DEFAULT_PROVIDER") {
            self.chat.default_provider = provider;
        }

        if let Ok(path) = std::env::var("COPILOT_STORAGE_PATH") {
            tracing::debug!(path = %path, "Env override: COPILOT_STORAGE_PATH");
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(url) = &cli.backend_url {
            self.backend.base_url = url.clone();
        }
        if cli.frontend_only {
            self.direct.frontend_only_mode = true;
        }
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = url::Url::parse(&self.backend.base_url) {
            return Err(CopilotError::Config(format!(
                "Invalid backend.base_url '{}': {}",
                self.backend.base_url, e
            ))
            .into());
        }

        if self.backend.health_timeout_seconds == 0 {
            return Err(CopilotError::Config(
                "backend.health_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.backend.health_timeout_seconds > 60 {
            return Err(CopilotError::Config(
                "backend.health_timeout_seconds must be less than or equal to 60".to_string(),
            )
            .into());
        }

        if self.direct.provider_family.trim().is_empty() {
            return Err(
                CopilotError::Config("direct.provider_family cannot be empty".to_string()).into(),
            );
        }

        if let Err(e) = url::Url::parse(&self.direct.api_base) {
            return Err(CopilotError::Config(format!(
                "Invalid direct.api_base '{}': {}",
                self.direct.api_base, e
            ))
            .into());
        }

        if self.chat.default_provider.trim().is_empty() {
            return Err(
                CopilotError::Config("chat.default_provider cannot be empty".to_string()).into(),
            );
        }

        if self.storage.namespace.trim().is_empty() {
            return Err(
                CopilotError::Config("storage.namespace cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}
