//! Command-line interface definition for the copilot sidebar
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for chatting, one-shot questions, session management
//! and backend diagnostics.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Copilot sidebar - multi-session AI chat in the terminal
///
/// Streams replies from the chat backend (or directly from Gemini in
/// frontend-only mode), keeps every conversation as a session and can fan a
/// prompt out to several models at once.
#[derive(Parser, Debug, Clone)]
#[command(name = "copilot-sidebar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the backend base URL
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Call Gemini directly instead of going through the backend
    #[arg(long, global = true)]
    pub frontend_only: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat bound to the current session
    Chat {
        /// Start a new session with this provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Comma-separated models for turbo mode (two or more)
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,
    },

    /// Ask a single question and print the reply
    Ask {
        /// The prompt to send
        prompt: String,

        /// Start a new session with this provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Comma-separated models for turbo mode (two or more)
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,

        /// Attach a file to the question (repeatable)
        #[arg(short, long)]
        attach: Vec<PathBuf>,
    },

    /// Manage stored sessions
    Sessions {
        /// Session management subcommand
        #[command(subcommand)]
        command: SessionsCommand,
    },

    /// Check that the backend is reachable
    Health {
        /// Also ask the backend to test its provider connections
        #[arg(long)]
        providers: bool,
    },

    /// List the models offered by the backend
    Models {
        /// Print the catalogue as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store the Gemini API key used in frontend-only mode
    Auth {
        /// The key; prompted for when omitted
        #[arg(long)]
        key: Option<String>,

        /// Remove the stored key instead
        #[arg(long, conflicts_with = "key")]
        clear: bool,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionsCommand {
    /// List all sessions
    List,

    /// Print one session's transcript
    Show {
        /// Session id
        id: String,
    },

    /// Make a session current
    Switch {
        /// Session id
        id: String,
    },

    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },

    /// Delete every session
    Clear,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            backend_url: None,
            frontend_only: false,
            command: Commands::Health { providers: false },
        }
    }
}
