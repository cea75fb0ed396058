use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use copilot_sidebar::notify::RecordingNotifier;
use copilot_sidebar::orchestrator::OrchestratorSettings;
use copilot_sidebar::persistence::{ChatStateRepository, SqliteKeyValueStorage};
use copilot_sidebar::transport::BackendTransport;
use copilot_sidebar::{AppState, SessionStore, StreamOrchestrator};

/// Render content chunks as a `data: <json>` body ending with `done`
#[allow(dead_code)]
pub fn sse_body(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let line = serde_json::json!({ "content": chunk });
        body.push_str(&format!("data: {}\n\n", line));
    }
    body.push_str("data: {\"done\":true}\n\n");
    body
}

/// Orchestrator talking to the backend at `base_url`
#[allow(dead_code)]
pub fn backend_orchestrator(base_url: &str) -> (StreamOrchestrator, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let backend = BackendTransport::new(base_url).expect("backend client");
    let state = Arc::new(AppState::new(SessionStore::new("gemini-2.5-flash")));
    let orchestrator = StreamOrchestrator::new(
        state,
        Arc::new(backend),
        notifier.clone(),
        OrchestratorSettings::default(),
    );
    (orchestrator, notifier)
}

#[allow(dead_code)]
pub fn create_temp_repository() -> (ChatStateRepository, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let storage = SqliteKeyValueStorage::new_with_path(tmp.path().join("state.db"))
        .expect("failed to create sqlite storage with path");
    (
        ChatStateRepository::new(Arc::new(storage), "test:chat-store"),
        tmp,
    )
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Poll `check` until it holds or two seconds pass
#[allow(dead_code)]
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
