//! Copilot Sidebar - multi-session AI chat core
//!
//! This library holds the session and stream state of a chat assistant:
//! it keeps several independent conversations, streams assistant replies
//! into them token by token, lets a prompt fan out to several models at
//! once ("turbo mode"), and persists the conversations between runs.
//!
//! # Architecture
//!
//! - `stream`: `data: <json>` line decoding and body reading under cancellation
//! - `session`: session store, chat turns and per-session runtime state
//! - `ui_state`: transient interface state (input, loading, turbo panel)
//! - `state`: shared handle over both stores with change notifications
//! - `orchestrator`: submission state machine, turbo fan-out and promotion
//! - `transport`: backend proxy, direct provider client and health probe
//! - `persistence`: key-value storage for the durable chat state
//! - `config`, `error`, `logging`: ambient configuration, errors and tracing
//! - `cli`, `commands`: the terminal front-end
//!
//! # Example
//!
//! ```no_run
//! use copilot_sidebar::{commands::ChatContext, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let context = ChatContext::bootstrap(&config).await?;
//!     context.orchestrator.submit("Hello!").await?;
//!     Ok(())
//! }
//! ```

pub mod attachments;
pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod persistence;
pub mod session;
pub mod state;
pub mod stream;
pub mod transport;
pub mod ui_state;

// Re-export commonly used types
pub use config::Config;
pub use error::{CopilotError, Result};
pub use orchestrator::{StreamOrchestrator, SubmissionOutcome, SubmissionReport};
pub use session::SessionStore;
pub use state::AppState;
pub use ui_state::UiState;
