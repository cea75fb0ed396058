/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`     - Interactive chat loop with slash commands
- `ask`      - One-shot question (single session or turbo)
- `sessions` - List, show, switch, delete and clear sessions
- `health`   - Backend connectivity check
- `models`   - Backend model catalogue
- `auth`     - Store the direct-provider API key

Every handler builds a [`ChatContext`] from the configuration, which loads
the persisted chat state, and saves it again when the command finishes.
*/

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::notify::ConsoleNotifier;
use crate::orchestrator::{OrchestratorSettings, StreamOrchestrator, SubmissionReport};
use crate::persistence::{ChatStateRepository, KeyValueStorage, SqliteKeyValueStorage};
use crate::session::{Role, SessionStore};
use crate::state::{AppState, StateChange};
use crate::transport::{BackendTransport, DirectProviderTransport};

pub mod special_commands;

pub mod ask;
pub mod auth;
pub mod chat;
pub mod health;
pub mod models;
pub mod sessions;

/// Everything a command needs to drive the chat core
#[derive(Debug, Clone)]
pub struct ChatContext {
    /// Orchestrator over the loaded state
    pub orchestrator: StreamOrchestrator,
    /// Where the chat state is saved
    pub repository: ChatStateRepository,
}

impl ChatContext {
    /// Load persisted state and wire transports from `config`
    ///
    /// A corrupt state blob is logged and replaced by a fresh store rather
    /// than aborting the command.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage or the HTTP client cannot be created.
    pub async fn bootstrap(config: &Config) -> Result<Self> {
        let storage: Arc<dyn KeyValueStorage> = match &config.storage.path {
            Some(path) => Arc::new(SqliteKeyValueStorage::new_with_path(path)?),
            None => Arc::new(SqliteKeyValueStorage::new()?),
        };
        let repository = ChatStateRepository::new(storage, config.storage.chat_state_key());
        Self::bootstrap_with_repository(config, repository).await
    }

    /// Same as [`ChatContext::bootstrap`] with a caller-provided repository
    pub async fn bootstrap_with_repository(
        config: &Config,
        repository: ChatStateRepository,
    ) -> Result<Self> {
        let default_provider = config.chat.default_provider.clone();
        let store = match repository.load().await {
            Ok(Some(state)) => SessionStore::from_persisted(state, default_provider),
            Ok(None) => SessionStore::new(default_provider),
            Err(e) => {
                tracing::warn!("Ignoring unreadable chat state: {:#}", e);
                SessionStore::new(default_provider)
            }
        };
        tracing::debug!(
            sessions = store.total_sessions(),
            key = repository.key(),
            "Loaded chat state"
        );

        let state = Arc::new(AppState::new(store));
        let backend = Arc::new(BackendTransport::new(&config.backend.base_url)?);
        let mut orchestrator = StreamOrchestrator::new(
            state,
            backend,
            Arc::new(ConsoleNotifier),
            OrchestratorSettings::from_config(config),
        )
        .with_repository(repository.clone());

        if config.direct.frontend_only_mode {
            match CredentialStore::default().api_key()? {
                Some(key) => {
                    let direct = DirectProviderTransport::new(&config.direct, key)?;
                    orchestrator = orchestrator.with_direct_transport(Arc::new(direct));
                }
                None => tracing::info!(
                    "Frontend-only mode without an API key; run `copilot-sidebar auth` first"
                ),
            }
        }

        Ok(Self {
            orchestrator,
            repository,
        })
    }

    /// Select turbo models; one model simply becomes the provider
    pub async fn apply_model_selection(&self, models: Vec<String>) {
        match models.len() {
            0 => {}
            1 => {
                self.orchestrator.change_provider(&models[0]).await;
            }
            _ => self
                .orchestrator
                .state()
                .update_ui(|ui| ui.set_selected_models(models)),
        }
    }
}

/// Tracks how much of a streaming reply has been written to stdout
#[derive(Debug, Default)]
struct LivePrinter {
    printed: String,
}

impl LivePrinter {
    /// Print whatever `content` adds to what was already printed
    fn update(&mut self, content: &str) {
        if let Some(rest) = content.strip_prefix(self.printed.as_str()) {
            if !rest.is_empty() {
                print!("{}", rest);
                let _ = std::io::stdout().flush();
                self.printed = content.to_string();
            }
        }
    }
}

fn last_assistant_content(orchestrator: &StreamOrchestrator, session_id: &str) -> Option<String> {
    orchestrator.state().read_sessions(|store| {
        store
            .session(session_id)
            .and_then(|s| s.messages.last())
            .filter(|turn| turn.message.role == Role::Assistant)
            .map(|turn| turn.message.content.clone())
    })
}

/// Submit `input` and render the reply as it streams
///
/// Single submissions are printed live; turbo replies are printed per model
/// once every branch has settled. Ctrl-C cancels whatever is in flight.
///
/// # Errors
///
/// Propagates validation and missing-credential errors from the
/// orchestrator.
pub async fn submit_and_render(
    orchestrator: &StreamOrchestrator,
    input: &str,
) -> Result<Vec<SubmissionReport>> {
    let state = orchestrator.state().clone();
    let turbo = state.read_ui(|ui| ui.turbo_mode() && !ui.selected_models().is_empty());
    let target = if turbo {
        None
    } else {
        state.read_sessions(|s| s.current_session_id().map(str::to_string))
    };

    let mut changes = state.subscribe();
    let mut printer = LivePrinter::default();
    let submission = orchestrator.submit(input);
    tokio::pin!(submission);

    let result = loop {
        tokio::select! {
            result = &mut submission => break result,
            _ = tokio::signal::ctrl_c() => {
                if turbo {
                    let ids: Vec<String> =
                        state.read_ui(|ui| ui.turbo_sessions().values().cloned().collect());
                    for id in ids {
                        orchestrator.cancel_session(&id);
                    }
                } else {
                    orchestrator.cancel_current();
                }
            }
            change = changes.recv() => match change {
                Ok(StateChange::Session { session_id }) if target.as_deref() == Some(session_id.as_str()) => {
                    if let Some(content) = last_assistant_content(orchestrator, &session_id) {
                        printer.update(&content);
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {}
            },
        }
    };

    let reports = result?;
    if let Some(id) = &target {
        if let Some(content) = last_assistant_content(orchestrator, id) {
            printer.update(&content);
        }
        println!();
    } else {
        for report in &reports {
            println!(
                "\n{} {}",
                format!("── {} ──", report.model).bold(),
                report.session_id.dimmed()
            );
            println!(
                "{}",
                last_assistant_content(orchestrator, &report.session_id).unwrap_or_default()
            );
        }
        println!(
            "\nUse {} to keep chatting with one model.",
            "/continue <model>".cyan()
        );
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStorage;
    use crate::session::{ChatMessage, TurnStatus};

    fn repository() -> ChatStateRepository {
        ChatStateRepository::new(Arc::new(MemoryStorage::new()), "test:chat-store")
    }

    #[tokio::test]
    async fn test_bootstrap_restores_saved_state() {
        let repo = repository();
        let mut store = SessionStore::new("gpt-4o-mini");
        let id = store.current_session_id().unwrap().to_string();
        store.add_message(&id, ChatMessage::user("persisted"), TurnStatus::Done);
        repo.save(&store.to_persisted()).await.unwrap();

        let context = ChatContext::bootstrap_with_repository(&Config::default(), repo)
            .await
            .unwrap();
        context.orchestrator.state().read_sessions(|s| {
            assert_eq!(s.current_session_id(), Some(id.as_str()));
            assert_eq!(s.current_messages()[0].message.content, "persisted");
        });
    }

    #[tokio::test]
    async fn test_bootstrap_recovers_from_corrupt_state() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("k", "{broken").await.unwrap();
        let repo = ChatStateRepository::new(storage, "k");
        let context = ChatContext::bootstrap_with_repository(&Config::default(), repo)
            .await
            .unwrap();
        assert_eq!(
            context.orchestrator.state().read_sessions(|s| s.total_sessions()),
            1
        );
    }

    #[tokio::test]
    async fn test_apply_model_selection() {
        let context = ChatContext::bootstrap_with_repository(&Config::default(), repository())
            .await
            .unwrap();
        context
            .apply_model_selection(vec!["gpt-4o-mini".to_string()])
            .await;
        assert_eq!(
            context
                .orchestrator
                .state()
                .read_sessions(|s| s.selected_provider().to_string()),
            "gpt-4o-mini"
        );

        context
            .apply_model_selection(vec!["a".to_string(), "b".to_string()])
            .await;
        assert!(context.orchestrator.state().read_ui(|ui| ui.turbo_mode()));
    }

    #[test]
    fn test_live_printer_only_prints_extensions() {
        let mut printer = LivePrinter::default();
        printer.update("Hel");
        printer.update("Hello");
        assert_eq!(printer.printed, "Hello");
        printer.update("Error: replaced");
        assert_eq!(printer.printed, "Hello");
    }
}
