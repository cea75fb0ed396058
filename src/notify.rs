//! Fire-and-forget user notifications
//!
//! The orchestrator reports promotion success and non-cancellation failures
//! through a [`Notifier`]. Front-ends pick the surface: colored terminal
//! lines, tracing events, or a recorder in tests.

use std::sync::Mutex;

use colored::Colorize;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Something the user asked for happened
    Success,
    /// A request failed
    Error,
    /// Neutral information
    Info,
}

/// Notification surface
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Show `message` at `level`
    fn notify(&self, level: NotificationLevel, message: &str);

    fn success(&self, message: &str) {
        self.notify(NotificationLevel::Success, message);
    }

    fn error(&self, message: &str) {
        self.notify(NotificationLevel::Error, message);
    }

    fn info(&self, message: &str) {
        self.notify(NotificationLevel::Info, message);
    }
}

/// Prints colored lines to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        let line = match level {
            NotificationLevel::Success => format!("✓ {}", message).green(),
            NotificationLevel::Error => format!("✗ {}", message).red(),
            NotificationLevel::Info => format!("ℹ {}", message).cyan(),
        };
        eprintln!("{}", line);
    }
}

/// Emits notifications as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Error => tracing::error!(notification = %message),
            NotificationLevel::Success | NotificationLevel::Info => {
                tracing::info!(notification = %message)
            }
        }
    }
}

/// Keeps every notification for later inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    entries: Mutex<Vec<(NotificationLevel, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications in order
    pub fn entries(&self) -> Vec<(NotificationLevel, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Messages recorded at `level`
    pub fn messages(&self, level: NotificationLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}
