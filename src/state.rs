//! Shared application state
//!
//! [`AppState`] puts the [`SessionStore`] and [`UiState`] behind synchronous
//! locks. Every mutation runs to completion under its lock, so readers never
//! observe a half-applied change, and is followed by a [`StateChange`]
//! broadcast that renderers can subscribe to. Locks are never held across an
//! `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::session::{PersistedChatState, SessionStore};
use crate::ui_state::UiState;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// What part of the state a mutation touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    /// Session list, current pointer or provider facade
    Sessions,
    /// Messages or runtime state of one session
    Session {
        /// The touched session
        session_id: String,
    },
    /// UI mode state
    Ui,
}

/// Session and UI state with change notification
#[derive(Debug)]
pub struct AppState {
    sessions: Mutex<SessionStore>,
    ui: Mutex<UiState>,
    changes: broadcast::Sender<StateChange>,
}

impl AppState {
    /// Wrap an existing store with a fresh UI state
    pub fn new(store: SessionStore) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            sessions: Mutex::new(store),
            ui: Mutex::new(UiState::new()),
            changes,
        }
    }

    /// Receive every subsequent change
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Subscribe as a stream; lagged notifications surface as errors
    pub fn change_stream(&self) -> BroadcastStream<StateChange> {
        BroadcastStream::new(self.subscribe())
    }

    /// Read the session store
    pub fn read_sessions<R>(&self, f: impl FnOnce(&SessionStore) -> R) -> R {
        f(&lock(&self.sessions))
    }

    /// Mutate the session list and broadcast [`StateChange::Sessions`]
    pub fn update_sessions<R>(&self, f: impl FnOnce(&mut SessionStore) -> R) -> R {
        let result = f(&mut lock(&self.sessions));
        self.notify(StateChange::Sessions);
        result
    }

    /// Mutate one session and broadcast [`StateChange::Session`]
    pub fn update_session<R>(&self, session_id: &str, f: impl FnOnce(&mut SessionStore) -> R) -> R {
        let result = f(&mut lock(&self.sessions));
        self.notify(StateChange::Session {
            session_id: session_id.to_string(),
        });
        result
    }

    /// Read the UI state
    pub fn read_ui<R>(&self, f: impl FnOnce(&UiState) -> R) -> R {
        f(&lock(&self.ui))
    }

    /// Mutate the UI state and broadcast [`StateChange::Ui`]
    pub fn update_ui<R>(&self, f: impl FnOnce(&mut UiState) -> R) -> R {
        let result = f(&mut lock(&self.ui));
        self.notify(StateChange::Ui);
        result
    }

    /// Snapshot of everything that is persisted
    pub fn persisted(&self) -> PersistedChatState {
        self.read_sessions(SessionStore::to_persisted)
    }

    fn notify(&self, change: StateChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChatMessage, TurnStatus};

    #[tokio::test]
    async fn test_mutations_are_broadcast() {
        let state = AppState::new(SessionStore::default());
        let mut rx = state.subscribe();

        let id = state.update_sessions(|s| s.create_session("p"));
        state.update_session(&id, |s| s.add_message(&id, ChatMessage::user("hi"), TurnStatus::Done));
        state.update_ui(|ui| ui.set_input_value("x"));

        assert_eq!(rx.recv().await.unwrap(), StateChange::Sessions);
        assert_eq!(
            rx.recv().await.unwrap(),
            StateChange::Session { session_id: id.clone() }
        );
        assert_eq!(rx.recv().await.unwrap(), StateChange::Ui);
        assert_eq!(state.read_sessions(|s| s.session(&id).unwrap().messages.len()), 1);
    }

    #[test]
    fn test_update_without_subscribers_is_fine() {
        let state = AppState::new(SessionStore::default());
        state.update_ui(|ui| ui.set_loading(true));
        assert!(state.read_ui(|ui| ui.loading()));
    }

    #[test]
    fn test_persisted_snapshot() {
        let state = AppState::new(SessionStore::new("p"));
        let snapshot = state.persisted();
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.selected_provider, "p");
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let state = std::sync::Arc::new(AppState::new(SessionStore::default()));
        let clone = state.clone();
        let _ = std::thread::spawn(move || {
            clone.update_ui(|_| panic!("poison"));
        })
        .join();
        state.update_ui(|ui| ui.set_input_value("still works"));
        assert_eq!(state.read_ui(|ui| ui.input_value().to_string()), "still works");
    }
}
