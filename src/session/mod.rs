//! Session store
//!
//! [`SessionStore`] owns the ordered session list (newest first), the
//! current-session pointer, the selected-provider facade and a parallel map
//! of runtime-only state. All operations are synchronous; reads of unknown
//! session ids return defaults instead of failing.

pub mod runtime;
pub mod types;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use runtime::{AbortHandle, SessionRuntime};
pub use types::{
    next_session_id, truncate_chars, ChatMessage, ChatTurn, FileDescriptor, Role, Session,
    SessionSummary, TurnStatus, AUTO_LABEL_CHARS, DEFAULT_PROVIDER, DEFAULT_SESSION_LABEL,
};

/// The durable part of the store, stored as one blob
///
/// Legacy blobs may still carry per-session `loading` or `abortController`
/// fields; unknown fields are ignored on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedChatState {
    /// Current session pointer
    #[serde(default)]
    pub current_session_id: Option<String>,
    /// Provider facade
    #[serde(default = "default_selected_provider")]
    pub selected_provider: String,
    /// Sessions, newest first
    #[serde(default)]
    pub sessions: Vec<Session>,
}

fn default_selected_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

/// Owner of every conversation session
#[derive(Debug)]
pub struct SessionStore {
    sessions: Vec<Session>,
    runtime: HashMap<String, SessionRuntime>,
    current_session_id: Option<String>,
    selected_provider: String,
    default_provider: String,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER)
    }
}

impl SessionStore {
    /// Create a store holding one fresh default session
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_sidebar::session::SessionStore;
    ///
    /// let store = SessionStore::new("gemini-2.5-flash");
    /// assert_eq!(store.total_sessions(), 1);
    /// assert_eq!(store.current_session().unwrap().label, "New session");
    /// ```
    pub fn new(default_provider: impl Into<String>) -> Self {
        let default_provider = default_provider.into();
        let mut store = Self::empty(default_provider);
        let provider = store.default_provider.clone();
        store.create_session(&provider);
        store
    }

    fn empty(default_provider: String) -> Self {
        Self {
            sessions: Vec::new(),
            runtime: HashMap::new(),
            current_session_id: None,
            selected_provider: default_provider.clone(),
            default_provider,
        }
    }

    /// Rebuild a store from its persisted blob
    ///
    /// Runtime state starts fresh and turns saved mid-stream are closed as
    /// `Done`. A dangling or missing current pointer is repaired to the head
    /// of the list; an empty blob yields one default session.
    pub fn from_persisted(state: PersistedChatState, default_provider: impl Into<String>) -> Self {
        let mut store = Self::empty(default_provider.into());
        store.sessions = state.sessions;
        store.selected_provider = state.selected_provider;

        for session in &mut store.sessions {
            for turn in &mut session.messages {
                if turn.status != TurnStatus::Done {
                    tracing::debug!(session_id = %session.id, "Closing interrupted turn");
                    turn.status = TurnStatus::Done;
                }
            }
        }

        let current_exists = state
            .current_session_id
            .as_deref()
            .map(|id| store.session(id).is_some())
            .unwrap_or(false);
        store.current_session_id = if current_exists {
            state.current_session_id
        } else {
            if state.current_session_id.is_some() {
                tracing::warn!("Persisted current session no longer exists, using newest");
            }
            store.sessions.first().map(|s| s.id.clone())
        };

        if store.sessions.is_empty() {
            let provider = store.default_provider.clone();
            store.create_session(&provider);
        }
        store
    }

    /// Snapshot the durable part of the store
    pub fn to_persisted(&self) -> PersistedChatState {
        PersistedChatState {
            current_session_id: self.current_session_id.clone(),
            selected_provider: self.selected_provider.clone(),
            sessions: self.sessions.clone(),
        }
    }

    /// Provider used when no explicit provider is given
    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    // ---------------------------------------------------------------------
    // Session lifecycle
    // ---------------------------------------------------------------------

    /// Insert a new session at the head and make it current
    pub fn create_session(&mut self, provider: &str) -> String {
        let id = next_session_id();
        self.sessions.insert(0, Session::new(id.clone(), provider));
        self.current_session_id = Some(id.clone());
        self.selected_provider = provider.to_string();
        tracing::debug!(session_id = %id, provider, "Created session");
        id
    }

    /// Insert a session with a caller-chosen id without changing current
    ///
    /// An existing session with the same id is left untouched.
    pub fn add_session(&mut self, id: &str, provider: &str) {
        if self.session(id).is_some() {
            tracing::warn!(session_id = %id, "Session already exists, not adding");
            return;
        }
        self.sessions.insert(0, Session::new(id, provider));
    }

    /// Remove a session and its runtime state
    ///
    /// When the current session is removed the new head becomes current;
    /// if the list is now empty the pointer is cleared and the caller is
    /// expected to create a session.
    pub fn delete_session(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }
        self.runtime.remove(id);

        if self.current_session_id.as_deref() == Some(id) {
            self.current_session_id = self.sessions.first().map(|s| s.id.clone());
            if let Some(head) = self.sessions.first() {
                self.selected_provider = head.provider.clone();
            }
        }
        true
    }

    /// Switch the current session; unknown ids are ignored
    pub fn set_current_session(&mut self, id: &str) -> bool {
        let provider = match self.session(id) {
            Some(session) => session.provider.clone(),
            None => return false,
        };
        self.current_session_id = Some(id.to_string());
        self.selected_provider = provider;
        true
    }

    /// Replace everything with a single fresh default session
    ///
    /// In-flight requests are aborted first.
    pub fn clear_all_sessions(&mut self) -> String {
        for runtime in self.runtime.values() {
            if let Some(handle) = &runtime.abort_handle {
                handle.abort();
            }
        }
        self.runtime.clear();
        self.sessions.clear();
        self.current_session_id = None;
        let provider = self.default_provider.clone();
        self.create_session(&provider)
    }

    /// Rename a session
    pub fn update_session_label(&mut self, id: &str, label: &str) {
        if let Some(session) = self.session_mut(id) {
            session.label = label.to_string();
            session.touch();
        }
    }

    /// Change the provider facade and the current session's provider
    pub fn set_selected_provider(&mut self, provider: &str) {
        self.selected_provider = provider.to_string();
        if let Some(id) = self.current_session_id.clone() {
            if let Some(session) = self.session_mut(&id) {
                session.provider = provider.to_string();
                session.touch();
            }
        }
    }

    // ---------------------------------------------------------------------
    // Messages
    // ---------------------------------------------------------------------

    /// Append a turn
    ///
    /// The first user message of a session with the default label names the
    /// session after its first 20 characters. Later messages never rename.
    pub fn add_message(&mut self, id: &str, message: ChatMessage, status: TurnStatus) {
        let Some(session) = self.session_mut(id) else {
            tracing::warn!(session_id = %id, "add_message on unknown session");
            return;
        };
        if session.has_default_label() && message.role == Role::User {
            session.label = truncate_chars(&message.content, AUTO_LABEL_CHARS);
        }
        session.messages.push(ChatTurn::new(message, status));
        session.touch();
    }

    /// Overwrite the last turn's content if it is an assistant turn
    pub fn update_last_message(&mut self, id: &str, content: &str) {
        if let Some(session) = self.session_mut(id) {
            if let Some(turn) = session.messages.last_mut() {
                if turn.message.role == Role::Assistant {
                    turn.message.content = content.to_string();
                    session.touch();
                }
            }
        }
    }

    /// Append to the last turn's content if it is an assistant turn
    pub fn append_to_last_message(&mut self, id: &str, delta: &str) {
        if let Some(session) = self.session_mut(id) {
            if let Some(turn) = session.messages.last_mut() {
                if turn.message.role == Role::Assistant {
                    turn.message.content.push_str(delta);
                    session.touch();
                }
            }
        }
    }

    /// Set the status of the last turn, whatever its role
    pub fn update_last_message_status(&mut self, id: &str, status: TurnStatus) {
        if let Some(session) = self.session_mut(id) {
            if let Some(turn) = session.messages.last_mut() {
                turn.status = status;
                session.touch();
            }
        }
    }

    /// Set the status of the turn at `index`
    pub fn update_message_status(&mut self, id: &str, index: usize, status: TurnStatus) {
        if let Some(session) = self.session_mut(id) {
            if let Some(turn) = session.messages.get_mut(index) {
                turn.status = status;
                session.touch();
            }
        }
    }

    // ---------------------------------------------------------------------
    // Runtime state and attachments
    // ---------------------------------------------------------------------

    /// Set the loading flag
    pub fn set_session_loading(&mut self, id: &str, loading: bool) {
        if !self.contains(id) {
            return;
        }
        self.runtime.entry(id.to_string()).or_default().loading = loading;
        self.touch(id);
    }

    /// Loading flag, false for unknown ids
    pub fn session_loading(&self, id: &str) -> bool {
        self.runtime.get(id).map(|r| r.loading).unwrap_or(false)
    }

    /// Replace the pending attachments
    pub fn set_session_files(&mut self, id: &str, files: Vec<FileDescriptor>) {
        if let Some(session) = self.session_mut(id) {
            session.files = files;
            session.touch();
        }
    }

    /// Pending attachments, empty for unknown ids
    pub fn session_files(&self, id: &str) -> Vec<FileDescriptor> {
        self.session(id).map(|s| s.files.clone()).unwrap_or_default()
    }

    /// Drop all pending attachments
    pub fn clear_session_files(&mut self, id: &str) {
        self.set_session_files(id, Vec::new());
    }

    /// Install an abort handle, replacing any previous one
    pub fn set_session_abort_handle(&mut self, id: &str, handle: Option<AbortHandle>) {
        if !self.contains(id) {
            return;
        }
        self.runtime.entry(id.to_string()).or_default().abort_handle = handle;
        self.touch(id);
    }

    /// Current abort handle, if any
    pub fn session_abort_handle(&self, id: &str) -> Option<AbortHandle> {
        self.runtime.get(id).and_then(|r| r.abort_handle.clone())
    }

    /// Reuse the session's live handle or install a fresh one
    ///
    /// A handle that has already been aborted is never reused, so a session
    /// holds at most one live handle.
    pub fn obtain_abort_handle(&mut self, id: &str) -> AbortHandle {
        if let Some(handle) = self.session_abort_handle(id) {
            if !handle.is_aborted() {
                return handle;
            }
        }
        let handle = AbortHandle::new();
        self.set_session_abort_handle(id, Some(handle.clone()));
        handle
    }

    /// Cancel the in-flight request, drop its handle and stop loading
    ///
    /// Safe to call repeatedly or on sessions without a handle.
    pub fn abort_session_request(&mut self, id: &str) {
        if let Some(runtime) = self.runtime.get_mut(id) {
            if let Some(handle) = runtime.abort_handle.take() {
                handle.abort();
                tracing::info!(session_id = %id, "Aborted session request");
            }
            runtime.loading = false;
        }
        self.touch(id);
    }

    // ---------------------------------------------------------------------
    // Selectors
    // ---------------------------------------------------------------------

    /// Current session pointer
    pub fn current_session_id(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    /// The current session
    pub fn current_session(&self) -> Option<&Session> {
        self.current_session_id.as_deref().and_then(|id| self.session(id))
    }

    /// Turns of the current session
    pub fn current_messages(&self) -> &[ChatTurn] {
        self.current_session()
            .map(|s| s.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Provider facade
    pub fn selected_provider(&self) -> &str {
        &self.selected_provider
    }

    /// Look up a session
    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// All sessions, newest first
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Listing snapshot of every session
    pub fn session_list(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                label: s.label.clone(),
                provider: s.provider.clone(),
                message_count: s.messages.len(),
                file_count: s.files.len(),
                loading: self.session_loading(&s.id),
                is_current: self.current_session_id.as_deref() == Some(s.id.as_str()),
                updated_at: s.updated_at,
            })
            .collect()
    }

    /// Number of sessions
    pub fn total_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Number of turns across all sessions
    pub fn total_messages(&self) -> usize {
        self.sessions.iter().map(|s| s.messages.len()).sum()
    }

    fn contains(&self, id: &str) -> bool {
        self.session(id).is_some()
    }

    fn session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    fn touch(&mut self, id: &str) {
        if let Some(session) = self.session_mut(id) {
            session.touch();
        }
    }
}
