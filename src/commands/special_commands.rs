//! Special commands parser for interactive chat mode
//!
//! Special commands manage sessions and turbo mode from inside the chat
//! loop instead of being sent as a message:
//! - Start, list, switch and delete sessions
//! - Select models for turbo mode and continue with one of them
//! - Attach files to the next message
//! - Display help information
//! - Exit the session
//!
//! Commands are prefixed with `/`; the command word is case-insensitive,
//! arguments (session ids, model names, paths) are kept as typed.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new session, optionally with another provider
    NewSession(Option<String>),

    /// List every session
    ListSessions,

    /// Make another session current
    SwitchSession(String),

    /// Delete a session
    DeleteSession(String),

    /// Select the models used by turbo mode
    SelectModels(Vec<String>),

    /// Promote one turbo branch to the current session
    ContinueWith(String),

    /// Leave turbo mode
    TurboOff,

    /// Attach a file to the next message
    Attach(PathBuf),

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input should be submitted as a regular message.
    None,
}

/// Parse user input into a special command
///
/// # Arguments
///
/// * `input` - The user input string
///
/// # Returns
///
/// Returns the parsed command, [`SpecialCommand::None`] for ordinary
/// messages, or a [`CommandError`] for malformed commands
///
/// # Examples
///
/// ```
/// use copilot_sidebar::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::NewSession(None));
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (command, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((command, arg)) => (command.to_lowercase(), arg.trim()),
        None => (lower.clone(), ""),
    };

    match command.as_str() {
        "/new" => Ok(SpecialCommand::NewSession(non_empty(arg))),
        "/sessions" | "/ls" => Ok(SpecialCommand::ListSessions),
        "/switch" => required(arg, "/switch", "/switch <session_id>")
            .map(SpecialCommand::SwitchSession),
        "/delete" => required(arg, "/delete", "/delete <session_id>")
            .map(SpecialCommand::DeleteSession),
        "/models" => {
            let models: Vec<String> = arg
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            if models.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/models".to_string(),
                    usage: "/models <model_a,model_b,...>".to_string(),
                })
            } else {
                Ok(SpecialCommand::SelectModels(models))
            }
        }
        "/continue" => required(arg, "/continue", "/continue <model>")
            .map(SpecialCommand::ContinueWith),
        "/turbo-off" => Ok(SpecialCommand::TurboOff),
        "/attach" => required(arg, "/attach", "/attach <path>")
            .map(|path| SpecialCommand::Attach(PathBuf::from(path))),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" | "exit" | "quit" => Ok(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

fn non_empty(arg: &str) -> Option<String> {
    if arg.is_empty() {
        None
    } else {
        Some(arg.to_string())
    }
}

fn required(arg: &str, command: &str, usage: &str) -> Result<String, CommandError> {
    non_empty(arg).ok_or_else(|| CommandError::MissingArgument {
        command: command.to_string(),
        usage: usage.to_string(),
    })
}

/// Display help information for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
==========================================

SESSIONS:
  /new [provider]     - Start a new session (empty sessions are replaced)
  /sessions           - List all sessions
  /switch <id>        - Make another session current
  /delete <id>        - Delete a session

TURBO MODE:
  /models a,b         - Send the next messages to several models at once
  /continue <model>   - Keep chatting with one model's turbo session
  /turbo-off          - Leave turbo mode

ATTACHMENTS:
  /attach <path>      - Attach a file to the next message

OTHER:
  /help               - Show this help message
  /exit               - Exit interactive chat (also: exit, quit)

Press Ctrl-C while a reply is streaming to cancel it.
"#
    );
}
