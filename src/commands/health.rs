use std::time::Duration;

use colored::Colorize;

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::{CopilotError, Result};
use crate::transport::{BackendTransport, ConnectionStatus, HealthChecker};

/// Check backend connectivity
///
/// In frontend-only mode a missing API key is reported as a setup problem.
///
/// # Errors
///
/// Returns [`CopilotError::Connectivity`] when the backend is unreachable,
/// so the process exits with a non-zero status.
pub async fn run_health(config: &Config, providers: bool) -> Result<()> {
    let checker = HealthChecker::new(
        &config.backend.base_url,
        Duration::from_secs(config.backend.health_timeout_seconds),
    )?;

    let status = checker.check().await;
    match &status {
        ConnectionStatus::Connected { environment } => {
            println!(
                "{} {} {}",
                "✓".green(),
                config.backend.base_url.cyan(),
                environment
                    .as_deref()
                    .map(|env| format!("({})", env))
                    .unwrap_or_default()
            );
        }
        ConnectionStatus::Unreachable { reason } => {
            println!(
                "{} {} {}",
                "✗".red(),
                config.backend.base_url.cyan(),
                reason.red()
            );
        }
    }

    if config.direct.frontend_only_mode && CredentialStore::default().api_key()?.is_none() {
        println!(
            "{} frontend-only mode needs an API key, run {}",
            "!".yellow(),
            "copilot-sidebar auth".cyan()
        );
    }

    if let ConnectionStatus::Unreachable { reason } = status {
        return Err(CopilotError::Connectivity(format!(
            "Backend at {} is unreachable: {}",
            config.backend.base_url, reason
        ))
        .into());
    }

    if providers {
        let backend = BackendTransport::new(&config.backend.base_url)?;
        let results = backend.test_connections().await?;
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    Ok(())
}
