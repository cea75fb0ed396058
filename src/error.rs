//! Error types for the copilot sidebar core
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for copilot sidebar operations
///
/// Stream-level failures (a backend that emits an `error` payload, a
/// connection that drops) are normally folded into session content by the
/// orchestrator. The variants here cover everything that is surfaced to
/// callers as a `Result`.
#[derive(Error, Debug)]
pub enum CopilotError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before any state was touched
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport failures while opening or reading a response stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed data received from a transport
    #[error("Decode error: {0}")]
    Decode(String),

    /// The request was cancelled through its abort handle
    #[error("Request was cancelled")]
    Cancelled,

    /// Provider-related errors (direct provider API failures)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Missing credentials for provider
    #[error("Missing credentials for provider: {0}")]
    MissingCredentials(String),

    /// Backend reachability problems
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Chat state storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A session id that does not exist in the store
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for copilot sidebar operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// Returns true when the error chain contains a cancellation
///
/// Cancellation is an expected terminal state rather than a failure, so
/// callers use this to suppress error notifications.
///
/// # Examples
///
/// ```
/// use copilot_sidebar::error::{is_cancellation, CopilotError};
///
/// let err: anyhow::Error = CopilotError::Cancelled.into();
/// assert!(is_cancellation(&err));
/// ```
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<CopilotError>(), Some(CopilotError::Cancelled)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = CopilotError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_validation_error_display() {
        let error = CopilotError::Validation("input is empty".to_string());
        assert_eq!(error.to_string(), "Validation error: input is empty");
    }

    #[test]
    fn test_cancelled_error_display() {
        assert_eq!(CopilotError::Cancelled.to_string(), "Request was cancelled");
    }

    #[test]
    fn test_missing_credentials_error_display() {
        let error = CopilotError::MissingCredentials("gemini-2.5-flash".to_string());
        assert_eq!(
            error.to_string(),
            "Missing credentials for provider: gemini-2.5-flash"
        );
    }

    #[test]
    fn test_session_not_found_display() {
        let error = CopilotError::SessionNotFound("42".to_string());
        assert_eq!(error.to_string(), "Session not found: 42");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: CopilotError = io_error.into();
        assert!(matches!(error, CopilotError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: CopilotError = json_error.into();
        assert!(matches!(error, CopilotError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: CopilotError = yaml_error.into();
        assert!(matches!(error, CopilotError::Yaml(_)));
    }

    #[test]
    fn test_is_cancellation_detects_wrapped_cancel() {
        let err = anyhow::Error::from(CopilotError::Cancelled).context("while opening stream");
        assert!(is_cancellation(&err));
    }

    #[test]
    fn test_is_cancellation_rejects_other_errors() {
        let err: anyhow::Error = CopilotError::Transport("HTTP error! status: 500".into()).into();
        assert!(!is_cancellation(&err));
        assert!(!is_cancellation(&anyhow::anyhow!("boom")));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CopilotError>();
    }
}
