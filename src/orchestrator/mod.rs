//! Stream orchestration
//!
//! [`StreamOrchestrator`] ties the session store, the UI state and the chat
//! transports together. It owns the submission state machine
//! (`Idle -> Submitting -> Streaming -> Completed | Errored | Cancelled`),
//! the turbo fan-out, promotion out of turbo mode and the session lifecycle
//! rules that depend on both stores (delete-if-empty, UI reset on switch).
//!
//! Every per-request failure is converted into a session-state mutation at
//! the branch boundary. Only validation and missing-credential problems are
//! returned to the caller, and those are detected before anything changes.

mod submission;
mod turbo;

use std::path::Path;
use std::sync::Arc;

use crate::attachments::file_descriptor_from_path;
use crate::config::{Config, DirectConfig};
use crate::error::{CopilotError, Result};
use crate::notify::Notifier;
use crate::persistence::ChatStateRepository;
use crate::session::{truncate_chars, FileDescriptor, Session};
use crate::state::AppState;
use crate::transport::ChatTransport;
use crate::ui_state::UiState;

pub use submission::{SubmissionOutcome, SubmissionPhase, SubmissionReport};
pub use turbo::turbo_session_id;

/// Content written into an empty reply when its request is cancelled
pub const CANCELLED_PLACEHOLDER: &str = "Request was cancelled";

/// Characters of the last user message kept in a promoted session's label
const PROMOTED_LABEL_CHARS: usize = 30;

/// Label for a promoted session without any user message
const PROMOTED_FALLBACK_LABEL: &str = "Turbo Mode Session";

/// Routing and request flags read from [`Config`]
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    /// Direct-provider routing
    pub direct: DirectConfig,
    /// Streaming preference forwarded on every backend request
    pub use_fake_stream: bool,
}

impl OrchestratorSettings {
    /// Extract the settings the orchestrator needs
    pub fn from_config(config: &Config) -> Self {
        Self {
            direct: config.direct.clone(),
            use_fake_stream: config.backend.use_fake_stream,
        }
    }
}

/// Drives submissions against the shared [`AppState`]
///
/// Cloning is cheap; clones share the same state, transports and notifier,
/// which is how turbo branches run on their own tasks.
#[derive(Debug, Clone)]
pub struct StreamOrchestrator {
    state: Arc<AppState>,
    backend: Arc<dyn ChatTransport>,
    direct: Option<Arc<dyn ChatTransport>>,
    notifier: Arc<dyn Notifier>,
    repository: Option<ChatStateRepository>,
    settings: OrchestratorSettings,
}

impl StreamOrchestrator {
    /// Create an orchestrator that sends everything through `backend`
    pub fn new(
        state: Arc<AppState>,
        backend: Arc<dyn ChatTransport>,
        notifier: Arc<dyn Notifier>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            state,
            backend,
            direct: None,
            notifier,
            repository: None,
            settings,
        }
    }

    /// Use `transport` for providers routed directly
    pub fn with_direct_transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.direct = Some(transport);
        self
    }

    /// Save the chat state after every terminal transition
    pub fn with_repository(mut self, repository: ChatStateRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Shared state driven by this orchestrator
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Pick the transport for `provider`
    ///
    /// # Errors
    ///
    /// Returns [`CopilotError::MissingCredentials`] when `provider` must be
    /// called directly but no direct transport was configured.
    pub(crate) fn transport_for(&self, provider: &str) -> Result<(Arc<dyn ChatTransport>, bool)> {
        if !self.settings.direct.routes_directly(provider) {
            return Ok((self.backend.clone(), false));
        }
        match &self.direct {
            Some(transport) => Ok((transport.clone(), true)),
            None => Err(CopilotError::MissingCredentials(format!(
                "{} requires an API key in frontend-only mode",
                provider
            ))
            .into()),
        }
    }

    /// Save the durable state, logging failures
    pub async fn persist(&self) {
        let Some(repository) = &self.repository else {
            return;
        };
        if let Err(e) = repository.save(&self.state.persisted()).await {
            tracing::warn!("Failed to save chat state: {:#}", e);
        }
    }

    // ---------------------------------------------------------------------
    // Session lifecycle
    // ---------------------------------------------------------------------

    /// Start a new session
    ///
    /// An empty current session is deleted first so untouched sessions do
    /// not pile up. UI state is reset for the new session.
    pub async fn new_session(&self, provider: Option<&str>) -> String {
        let id = self.state.update_sessions(|store| {
            let provider = provider
                .map(str::to_string)
                .unwrap_or_else(|| store.selected_provider().to_string());
            let empty_current = store
                .current_session()
                .filter(|s| s.messages.is_empty())
                .map(|s| s.id.clone());
            if let Some(empty) = empty_current {
                store.delete_session(&empty);
                tracing::debug!(session_id = %empty, "Removed empty session");
            }
            store.create_session(&provider)
        });
        self.state.update_ui(UiState::reset_ui_state);
        self.persist().await;
        tracing::info!(session_id = %id, "Started new session");
        id
    }

    /// Switch the conversation to another provider
    ///
    /// Follows the new-session rule: the replacement session is created
    /// alongside the current one unless the current one is empty.
    pub async fn change_provider(&self, provider: &str) -> String {
        self.new_session(Some(provider)).await
    }

    /// Make `id` the current session and reset UI state
    ///
    /// # Errors
    ///
    /// Returns [`CopilotError::SessionNotFound`] for unknown ids.
    pub async fn switch_session(&self, id: &str) -> Result<()> {
        if !self.state.update_sessions(|store| store.set_current_session(id)) {
            return Err(CopilotError::SessionNotFound(id.to_string()).into());
        }
        self.state.update_ui(UiState::reset_ui_state);
        self.persist().await;
        Ok(())
    }

    /// Delete a session, aborting its request first
    ///
    /// Deleting the last session leaves a fresh default one behind.
    ///
    /// # Errors
    ///
    /// Returns [`CopilotError::SessionNotFound`] for unknown ids.
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        let (deleted, was_current) = self.state.update_sessions(|store| {
            let was_current = store.current_session_id() == Some(id);
            store.abort_session_request(id);
            let deleted = store.delete_session(id);
            if store.total_sessions() == 0 {
                let provider = store.default_provider().to_string();
                store.create_session(&provider);
            }
            (deleted, was_current)
        });
        if !deleted {
            return Err(CopilotError::SessionNotFound(id.to_string()).into());
        }
        if was_current {
            self.state.update_ui(UiState::reset_ui_state);
        }
        self.persist().await;
        Ok(())
    }

    /// Abort everything and start over with one default session
    pub async fn clear_all_sessions(&self) -> String {
        let id = self.state.update_sessions(|store| store.clear_all_sessions());
        self.state.update_ui(UiState::reset_ui_state);
        self.persist().await;
        id
    }

    // ---------------------------------------------------------------------
    // Cancellation and turbo mode
    // ---------------------------------------------------------------------

    /// Cancel the current session's request
    ///
    /// Returns false when there is no current session or nothing in flight.
    pub fn cancel_current(&self) -> bool {
        let current = self
            .state
            .read_sessions(|store| store.current_session_id().map(str::to_string));
        match current {
            Some(id) => self.cancel_session(&id),
            None => false,
        }
    }

    /// Cancel one session's request without touching any other session
    ///
    /// Returns true only when a request was still streaming; a live handle
    /// kept for reuse after a finished reply does not count.
    pub fn cancel_session(&self, id: &str) -> bool {
        self.state.update_session(id, |store| {
            let in_flight = store.session_loading(id)
                && store
                    .session_abort_handle(id)
                    .map(|handle| !handle.is_aborted())
                    .unwrap_or(false);
            store.abort_session_request(id);
            in_flight
        })
    }

    /// Leave turbo mode without promoting a session
    pub fn cancel_turbo_mode(&self) {
        self.state.update_ui(UiState::cancel_turbo_mode);
    }

    /// Continue the conversation of one turbo branch as a normal session
    ///
    /// Falls back to a new session for `model` when its turbo session is
    /// gone. Turbo mode is switched off either way.
    pub async fn continue_with_model(&self, model: &str) -> String {
        let turbo_id = self
            .state
            .read_ui(|ui| ui.turbo_session_for(model).map(str::to_string));

        let session_id = self.state.update_sessions(|store| {
            match turbo_id.filter(|id| store.session(id).is_some()) {
                Some(id) => {
                    let label = store
                        .session(&id)
                        .and_then(Session::last_user_message)
                        .map(|m| {
                            format!("Turbo: {}...", truncate_chars(&m.content, PROMOTED_LABEL_CHARS))
                        })
                        .unwrap_or_else(|| PROMOTED_FALLBACK_LABEL.to_string());
                    store.set_current_session(&id);
                    store.update_session_label(&id, &label);
                    id
                }
                None => {
                    tracing::warn!(model, "Turbo session missing, starting a new session");
                    store.create_session(model)
                }
            }
        });

        self.state.update_ui(UiState::cancel_turbo_mode);
        self.notifier
            .success(&format!("Continuing conversation with {}", model));
        self.persist().await;
        session_id
    }

    // ---------------------------------------------------------------------
    // Attachments
    // ---------------------------------------------------------------------

    /// Attach a local file to the current session's next submission
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or there is no current
    /// session.
    pub async fn attach_file(&self, path: &Path) -> Result<FileDescriptor> {
        let file = file_descriptor_from_path(path).await?;
        let session_id = self
            .state
            .read_sessions(|store| store.current_session_id().map(str::to_string))
            .ok_or_else(|| CopilotError::SessionNotFound("no current session".to_string()))?;

        let files = self.state.update_session(&session_id, |store| {
            let mut files = store.session_files(&session_id);
            files.push(file.clone());
            store.set_session_files(&session_id, files.clone());
            files
        });
        self.state
            .update_ui(|ui| ui.set_current_session_files(files));
        self.persist().await;
        Ok(file)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::notify::{NotificationLevel, RecordingNotifier};
    use crate::persistence::MemoryStorage;
    use crate::session::{ChatMessage, SessionStore, TurnStatus};
    use crate::transport::fake::{Script, ScriptedTransport};

    pub(crate) struct Harness {
        pub orchestrator: StreamOrchestrator,
        pub transport: Arc<ScriptedTransport>,
        pub notifier: Arc<RecordingNotifier>,
        pub repository: ChatStateRepository,
    }

    pub(crate) fn harness(transport: ScriptedTransport) -> Harness {
        let transport = Arc::new(transport);
        let notifier = Arc::new(RecordingNotifier::new());
        let repository = ChatStateRepository::new(Arc::new(MemoryStorage::new()), "test:chat-store");
        let state = Arc::new(AppState::new(SessionStore::new("gemini-2.5-flash")));
        let orchestrator = StreamOrchestrator::new(
            state,
            transport.clone(),
            notifier.clone(),
            OrchestratorSettings::default(),
        )
        .with_repository(repository.clone());
        Harness {
            orchestrator,
            transport,
            notifier,
            repository,
        }
    }

    pub(crate) fn current_id(orchestrator: &StreamOrchestrator) -> String {
        orchestrator
            .state()
            .read_sessions(|s| s.current_session_id().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_new_session_replaces_empty_current() {
        let h = harness(ScriptedTransport::new());
        let before = current_id(&h.orchestrator);
        let id = h.orchestrator.new_session(None).await;
        h.orchestrator.state().read_sessions(|s| {
            assert_eq!(s.total_sessions(), 1);
            assert!(s.session(&before).is_none());
            assert_eq!(s.current_session_id(), Some(id.as_str()));
        });
    }

    #[tokio::test]
    async fn test_new_session_keeps_non_empty_current() {
        let h = harness(ScriptedTransport::new());
        let before = current_id(&h.orchestrator);
        h.orchestrator.state().update_session(&before, |s| {
            s.add_message(&before, ChatMessage::user("keep me"), TurnStatus::Done)
        });
        h.orchestrator.new_session(Some("gpt-4.1-nano")).await;
        h.orchestrator.state().read_sessions(|s| {
            assert_eq!(s.total_sessions(), 2);
            assert!(s.session(&before).is_some());
            assert_eq!(s.selected_provider(), "gpt-4.1-nano");
        });
    }

    #[tokio::test]
    async fn test_new_session_resets_ui_but_keeps_preferences() {
        let h = harness(ScriptedTransport::new());
        h.orchestrator.state().update_ui(|ui| {
            ui.set_expanded(true);
            ui.set_input_value("draft");
            ui.set_current_selection(Some("quoted".to_string()));
        });
        h.orchestrator.new_session(None).await;
        h.orchestrator.state().read_ui(|ui| {
            assert!(ui.is_expanded());
            assert_eq!(ui.input_value(), "");
            assert!(ui.current_selection().is_none());
        });
    }

    #[tokio::test]
    async fn test_change_provider_follows_empty_session_rule() {
        let h = harness(ScriptedTransport::new());
        h.orchestrator.change_provider("gpt-4o-mini").await;
        h.orchestrator.state().read_sessions(|s| {
            assert_eq!(s.total_sessions(), 1);
            assert_eq!(s.current_session().unwrap().provider, "gpt-4o-mini");
        });
    }

    #[tokio::test]
    async fn test_switch_session_unknown_is_error() {
        let h = harness(ScriptedTransport::new());
        let err = h.orchestrator.switch_session("missing").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CopilotError>(),
            Some(CopilotError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_switch_session_resets_ui() {
        let h = harness(ScriptedTransport::new());
        h.orchestrator
            .state()
            .update_sessions(|s| s.add_session("other", "gpt-4o-mini"));
        h.orchestrator
            .state()
            .update_ui(|ui| ui.set_input_value("draft"));
        h.orchestrator.switch_session("other").await.unwrap();
        assert_eq!(current_id(&h.orchestrator), "other");
        assert_eq!(
            h.orchestrator.state().read_ui(|ui| ui.input_value().to_string()),
            ""
        );
    }

    #[tokio::test]
    async fn test_delete_last_session_recreates_default() {
        let h = harness(ScriptedTransport::new());
        let only = current_id(&h.orchestrator);
        let handle = h
            .orchestrator
            .state()
            .update_session(&only, |s| s.obtain_abort_handle(&only));
        h.orchestrator.delete_session(&only).await.unwrap();

        assert!(handle.is_aborted());
        h.orchestrator.state().read_sessions(|s| {
            assert_eq!(s.total_sessions(), 1);
            assert_ne!(s.current_session_id(), Some(only.as_str()));
        });
        assert!(h.orchestrator.delete_session("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_clear_all_sessions_persists() {
        let h = harness(ScriptedTransport::new());
        h.orchestrator
            .state()
            .update_sessions(|s| s.add_session("b", "p"));
        let id = h.orchestrator.clear_all_sessions().await;
        let saved = h.repository.load().await.unwrap().unwrap();
        assert_eq!(saved.sessions.len(), 1);
        assert_eq!(saved.current_session_id, Some(id));
    }

    #[tokio::test]
    async fn test_cancel_session_without_request() {
        let h = harness(ScriptedTransport::new());
        assert!(!h.orchestrator.cancel_current());
        assert!(!h.orchestrator.cancel_session("missing"));
    }

    #[tokio::test]
    async fn test_cancel_after_finished_reply_reports_nothing_in_flight() {
        let h = harness(ScriptedTransport::new());
        h.orchestrator.submit("q").await.unwrap();
        assert!(!h.orchestrator.cancel_current());

        let id = current_id(&h.orchestrator);
        let last = h
            .orchestrator
            .state()
            .read_sessions(|s| s.current_messages().last().cloned())
            .unwrap();
        assert_eq!(last.message.content, "ok");
        assert!(!h.orchestrator.state().read_sessions(|s| s.session_loading(&id)));
    }

    #[tokio::test]
    async fn test_continue_with_model_promotes_turbo_session() {
        let h = harness(ScriptedTransport::new().with_fallback(Script::reply(&["hi"])));
        h.orchestrator.state().update_ui(|ui| {
            ui.set_selected_models(vec!["A".to_string(), "B".to_string()])
        });
        h.orchestrator
            .submit("Compare these two approaches to caching please")
            .await
            .unwrap();
        let turbo_b = h
            .orchestrator
            .state()
            .read_ui(|ui| ui.turbo_session_for("B").unwrap().to_string());

        let promoted = h.orchestrator.continue_with_model("B").await;

        assert_eq!(promoted, turbo_b);
        assert_eq!(current_id(&h.orchestrator), turbo_b);
        h.orchestrator.state().read_sessions(|s| {
            assert_eq!(
                s.session(&turbo_b).unwrap().label,
                "Turbo: Compare these two approaches t...",
            );
        });
        h.orchestrator.state().read_ui(|ui| {
            assert!(!ui.turbo_mode());
            assert!(!ui.turbo_mode_expanded());
            assert!(ui.selected_models().is_empty());
            assert!(ui.turbo_sessions().is_empty());
        });
        assert_eq!(
            h.notifier.messages(NotificationLevel::Success),
            vec!["Continuing conversation with B".to_string()]
        );
    }

    #[tokio::test]
    async fn test_continue_with_unknown_model_creates_session() {
        let h = harness(ScriptedTransport::new());
        let before = h.orchestrator.state().read_sessions(|s| s.total_sessions());
        let id = h.orchestrator.continue_with_model("gpt-4o-mini").await;
        h.orchestrator.state().read_sessions(|s| {
            assert_eq!(s.total_sessions(), before + 1);
            assert_eq!(s.session(&id).unwrap().provider, "gpt-4o-mini");
            assert_eq!(s.current_session_id(), Some(id.as_str()));
        });
    }

    #[tokio::test]
    async fn test_attach_file_adds_to_current_session() {
        let h = harness(ScriptedTransport::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let file = h.orchestrator.attach_file(&path).await.unwrap();
        let id = current_id(&h.orchestrator);
        assert_eq!(
            h.orchestrator.state().read_sessions(|s| s.session_files(&id)),
            vec![file]
        );
        assert!(h.orchestrator.state().read_ui(|ui| ui.summary().has_files));
    }

    #[test]
    fn test_direct_route_without_transport_is_missing_credentials() {
        let h = harness(ScriptedTransport::new());
        let mut orchestrator = h.orchestrator.clone();
        orchestrator.settings.direct.frontend_only_mode = true;
        let err = orchestrator.transport_for("gemini-2.5-flash").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CopilotError>(),
            Some(CopilotError::MissingCredentials(_))
        ));
        let (_, direct) = orchestrator.transport_for("gpt-4.1-nano").unwrap();
        assert!(!direct);
    }

    #[tokio::test]
    async fn test_direct_route_streams_without_backend_or_files() {
        let h = harness(ScriptedTransport::new());
        let direct =
            Arc::new(ScriptedTransport::new().with_fallback(Script::reply(&["direct", " reply"])));
        let mut orchestrator = h.orchestrator.clone().with_direct_transport(direct.clone());
        orchestrator.settings.direct.frontend_only_mode = true;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        orchestrator.attach_file(&path).await.unwrap();

        let reports = orchestrator.submit("Hi").await.unwrap();
        assert_eq!(reports[0].outcome, SubmissionOutcome::Completed);
        assert_eq!(reports[0].model, "gemini-2.5-flash");

        assert!(h.transport.requests().is_empty());
        let requests = direct.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].message, "Hi");
        assert!(requests[0].files.is_empty());

        let id = current_id(&orchestrator);
        orchestrator.state().read_sessions(|s| {
            let last = s.current_messages().last().unwrap();
            assert_eq!(last.message.content, "direct reply");
            assert_eq!(last.status, TurnStatus::Done);
            assert!(s.session_files(&id).is_empty());
        });
    }
}
