use colored::Colorize;
use prettytable::{format, Table};

use crate::cli::SessionsCommand;
use crate::commands::ChatContext;
use crate::config::Config;
use crate::error::{CopilotError, Result};
use crate::session::{truncate_chars, Role, Session, SessionSummary, TurnStatus};

const LABEL_WIDTH: usize = 40;

/// Handle session management commands
pub async fn handle_sessions(config: &Config, command: SessionsCommand) -> Result<()> {
    let context = ChatContext::bootstrap(config).await?;
    let orchestrator = &context.orchestrator;

    match command {
        SessionsCommand::List => {
            print_session_table(&orchestrator.state().read_sessions(|s| s.session_list()));
        }
        SessionsCommand::Show { id } => {
            let session = orchestrator
                .state()
                .read_sessions(|s| s.session(&id).cloned())
                .ok_or_else(|| CopilotError::SessionNotFound(id.clone()))?;
            print_transcript(&session);
        }
        SessionsCommand::Switch { id } => {
            orchestrator.switch_session(&id).await?;
            println!("{}", format!("Switched to session {}", id).green());
        }
        SessionsCommand::Delete { id } => {
            orchestrator.delete_session(&id).await?;
            println!("{}", format!("Deleted session {}", id).green());
        }
        SessionsCommand::Clear => {
            let id = orchestrator.clear_all_sessions().await;
            println!(
                "{}",
                format!("Cleared all sessions, started {}", id).green()
            );
        }
    }

    Ok(())
}

/// Print the session listing as a table
pub fn print_session_table(sessions: &[SessionSummary]) {
    if sessions.is_empty() {
        println!("{}", "No sessions found.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "",
        "ID".bold(),
        "Label".bold(),
        "Provider".bold(),
        "Messages".bold(),
        "Files".bold(),
        "Last Updated".bold()
    ]);

    for session in sessions {
        let marker = if session.is_current {
            "*".green()
        } else if session.loading {
            "~".yellow()
        } else {
            "".normal()
        };
        let label = if session.label.chars().count() > LABEL_WIDTH {
            format!("{}...", truncate_chars(&session.label, LABEL_WIDTH - 3))
        } else {
            session.label.clone()
        };
        let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();

        table.add_row(prettytable::row![
            marker,
            session.id.cyan(),
            label,
            session.provider,
            session.message_count,
            session.file_count,
            updated
        ]);
    }

    println!("\nSessions:");
    table.printstd();
    println!();
    println!(
        "Use {} to continue a session.",
        "copilot-sidebar sessions switch <ID>".cyan()
    );
    println!();
}

/// Print every turn of a session
pub fn print_transcript(session: &Session) {
    println!(
        "\n{} {} {}",
        session.label.bold(),
        format!("[{}]", session.provider).cyan(),
        session.id.dimmed()
    );
    if session.messages.is_empty() {
        println!("{}", "(no messages yet)".dimmed());
    }
    for turn in &session.messages {
        let speaker = match turn.message.role {
            Role::User => "you".green().bold(),
            Role::Assistant => "assistant".blue().bold(),
        };
        let status = match turn.status {
            TurnStatus::Done => String::new(),
            other => format!(" ({:?})", other).to_lowercase(),
        };
        println!("{}{}: {}", speaker, status.dimmed(), turn.message.content);
    }
    if !session.files.is_empty() {
        let names: Vec<&str> = session.files.iter().map(|f| f.name.as_str()).collect();
        println!("{} {}", "Pending files:".yellow(), names.join(", "));
    }
    println!();
}
