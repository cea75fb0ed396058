//! Interactive chat mode handler.
//!
//! Runs a readline loop bound to the current session. Plain lines are
//! submitted through the orchestrator; lines starting with `/` are parsed
//! as special commands.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::commands::sessions::{print_session_table, print_transcript};
use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
use crate::commands::{submit_and_render, ChatContext};
use crate::config::Config;
use crate::error::Result;

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `provider` - Start a new session with this provider
/// * `models` - Models selected for turbo mode
pub async fn run_chat(config: Config, provider: Option<String>, models: Vec<String>) -> Result<()> {
    tracing::info!("Starting interactive chat mode");

    let context = ChatContext::bootstrap(&config).await?;
    if let Some(provider) = provider.as_deref() {
        context.orchestrator.new_session(Some(provider)).await;
    }
    context.apply_model_selection(models).await;

    let mut rl = DefaultEditor::new()?;
    print_welcome_banner(&context);

    loop {
        let prompt = format_prompt(&context);
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                match parse_special_command(trimmed) {
                    Ok(SpecialCommand::None) => {}
                    Ok(SpecialCommand::Exit) => break,
                    Ok(command) => {
                        if let Err(e) = handle_special_command(&context, command).await {
                            eprintln!("{}", format!("Error: {:#}", e).red());
                        }
                        continue;
                    }
                    Err(e) => {
                        eprintln!("{}", e.to_string().yellow());
                        continue;
                    }
                }

                context
                    .orchestrator
                    .state()
                    .update_ui(|ui| ui.set_input_value(trimmed));
                println!();
                if let Err(e) = submit_and_render(&context.orchestrator, trimmed).await {
                    eprintln!("{}", format!("Error: {:#}", e).red());
                }
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                break;
            }
        }
    }

    context.orchestrator.persist().await;
    println!("Goodbye!");
    Ok(())
}

async fn handle_special_command(context: &ChatContext, command: SpecialCommand) -> Result<()> {
    let orchestrator = &context.orchestrator;
    match command {
        SpecialCommand::NewSession(provider) => {
            let id = orchestrator.new_session(provider.as_deref()).await;
            println!("{}", format!("Started session {}", id).green());
        }
        SpecialCommand::ListSessions => {
            print_session_table(&orchestrator.state().read_sessions(|s| s.session_list()));
        }
        SpecialCommand::SwitchSession(id) => {
            orchestrator.switch_session(&id).await?;
            println!("{}", format!("Switched to session {}", id).green());
            if let Some(session) = orchestrator.state().read_sessions(|s| s.session(&id).cloned()) {
                print_transcript(&session);
            }
        }
        SpecialCommand::DeleteSession(id) => {
            orchestrator.delete_session(&id).await?;
            println!("{}", format!("Deleted session {}", id).green());
        }
        SpecialCommand::SelectModels(models) => {
            let count = models.len();
            context.apply_model_selection(models).await;
            if count > 1 {
                let selected = orchestrator
                    .state()
                    .read_ui(|ui| ui.selected_models().join(", "));
                println!("{} {}", "Turbo mode:".bold(), selected.cyan());
            } else {
                println!("{}", "One model selected, started a new session with it".green());
            }
        }
        SpecialCommand::ContinueWith(model) => {
            let id = orchestrator.continue_with_model(&model).await;
            if let Some(session) = orchestrator.state().read_sessions(|s| s.session(&id).cloned()) {
                print_transcript(&session);
            }
        }
        SpecialCommand::TurboOff => {
            orchestrator.cancel_turbo_mode();
            println!("{}", "Turbo mode off".green());
        }
        SpecialCommand::Attach(path) => {
            let file = orchestrator.attach_file(&path).await?;
            println!(
                "{}",
                format!("Attached {} ({})", file.name, file.mime_type).green()
            );
        }
        SpecialCommand::Help => print_help(),
        SpecialCommand::Exit | SpecialCommand::None => {}
    }
    Ok(())
}

fn format_prompt(context: &ChatContext) -> String {
    let state = context.orchestrator.state();
    let summary = state.read_ui(|ui| ui.summary());
    if summary.turbo_mode {
        return format!(
            "{} {} ",
            format!("[turbo x{}]", summary.selected_model_count).magenta(),
            ">>".bold()
        );
    }
    let (provider, label) = state.read_sessions(|s| {
        s.current_session()
            .map(|c| (c.provider.clone(), c.label.clone()))
            .unwrap_or_default()
    });
    let files = if summary.has_files { " +files" } else { "" };
    format!(
        "{} {}{} {} ",
        format!("[{}]", provider).cyan(),
        label.dimmed(),
        files.yellow(),
        ">>".bold()
    )
}

/// Display welcome banner at the start of interactive chat mode
fn print_welcome_banner(context: &ChatContext) {
    let (sessions, label) = context.orchestrator.state().read_sessions(|s| {
        (
            s.total_sessions(),
            s.current_session().map(|c| c.label.clone()).unwrap_or_default(),
        )
    });
    println!();
    println!("{}", "Copilot Sidebar".bold().cyan());
    println!("Sessions: {}  Current: {}", sessions, label);
    println!(
        "Type {} for commands, {} to leave, Ctrl-C cancels a streaming reply.",
        "/help".cyan(),
        "/exit".cyan()
    );
    println!();
}
