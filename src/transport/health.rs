//! Backend connectivity probe

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{CopilotError, Result};

/// Outcome of a health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The backend answered `/health` with a success status
    Connected {
        /// Deployment environment reported by the backend
        environment: Option<String>,
    },
    /// The backend could not be reached in time
    Unreachable {
        /// Why the check failed
        reason: String,
    },
}

impl ConnectionStatus {
    /// True for [`ConnectionStatus::Connected`]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Polls `GET {base_url}/health` with a bounded wait
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HealthChecker {
    /// Create a checker
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CopilotError::Connectivity(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Probe the backend; never fails, reports unreachability instead
    pub async fn check(&self) -> ConnectionStatus {
        let url = format!("{}/health", self.base_url);
        let request = self.client.get(&url).send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Err(_) => {
                tracing::warn!("Health check timed out after {:?}", self.timeout);
                return ConnectionStatus::Unreachable {
                    reason: format!("timed out after {}s", self.timeout.as_secs()),
                };
            }
            Ok(Err(e)) => {
                tracing::warn!("Health check failed: {}", e);
                return ConnectionStatus::Unreachable {
                    reason: e.to_string(),
                };
            }
            Ok(Ok(response)) => response,
        };

        if !response.status().is_success() {
            return ConnectionStatus::Unreachable {
                reason: format!("HTTP error! status: {}", response.status().as_u16()),
            };
        }

        let body = response.json::<HealthBody>().await.ok();
        if let Some(body) = &body {
            tracing::debug!(
                status = ?body.status,
                timestamp = ?body.timestamp,
                "Backend health reported"
            );
        }
        ConnectionStatus::Connected {
            environment: body.and_then(|b| b.environment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_backend() {
        let checker = HealthChecker::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let status = checker.check().await;
        assert!(!status.is_connected());
    }

    #[test]
    fn test_health_body_parses() {
        let body: HealthBody = serde_json::from_str(
            r#"{"status":"OK","timestamp":"2024-05-01T10:00:00.000Z","environment":"development"}"#,
        )
        .unwrap();
        assert_eq!(body.status.as_deref(), Some("OK"));
        assert_eq!(body.environment.as_deref(), Some("development"));
        assert!(body.timestamp.is_some());
    }
}
