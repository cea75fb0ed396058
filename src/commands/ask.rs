use std::path::PathBuf;

use colored::Colorize;

use crate::commands::{submit_and_render, ChatContext};
use crate::config::Config;
use crate::error::{CopilotError, Result};
use crate::orchestrator::SubmissionOutcome;

/// Ask one question and print the reply
///
/// With two or more `models` the question is sent to each of them in turbo
/// mode. Attachments only apply to single-session questions.
///
/// # Errors
///
/// Returns an error when the question is rejected up front or any reply
/// ends in an error, so scripts see a non-zero exit status.
pub async fn run_ask(
    config: &Config,
    prompt: &str,
    provider: Option<String>,
    models: Vec<String>,
    attach: Vec<PathBuf>,
) -> Result<()> {
    let context = ChatContext::bootstrap(config).await?;
    let orchestrator = &context.orchestrator;

    if let Some(provider) = provider.as_deref() {
        orchestrator.new_session(Some(provider)).await;
    }
    context.apply_model_selection(models).await;

    if !attach.is_empty() && orchestrator.state().read_ui(|ui| ui.turbo_mode()) {
        println!(
            "{}",
            "Attachments are not sent in turbo mode, ignoring them".yellow()
        );
    } else {
        for path in &attach {
            orchestrator.attach_file(path).await?;
        }
    }

    let reports = submit_and_render(orchestrator, prompt).await?;
    orchestrator.persist().await;

    let failed = reports
        .iter()
        .filter(|r| matches!(r.outcome, SubmissionOutcome::Errored(_)))
        .count();
    if failed > 0 {
        return Err(CopilotError::Provider(format!(
            "{} of {} replies failed",
            failed,
            reports.len()
        ))
        .into());
    }
    Ok(())
}
