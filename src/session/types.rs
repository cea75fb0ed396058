//! Persisted session records
//!
//! Everything in this module is plain serializable data. Runtime-only state
//! (loading flags, abort handles) lives in [`crate::session::runtime`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label given to sessions until the first user message arrives
pub const DEFAULT_SESSION_LABEL: &str = "New session";

/// Provider used when none is specified
pub const DEFAULT_PROVIDER: &str = "gemini-2.5-flash";

/// Number of characters of the first user message used as a label
pub const AUTO_LABEL_CHARS: usize = 20;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user
    User,
    /// Message produced by a model
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Role and content pair, also the wire shape of conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author
    pub role: Role,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Lifecycle of a chat turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    /// Not yet started
    Pending,
    /// Assistant turn still receiving content
    Loading,
    /// Terminal
    #[default]
    Done,
}

/// One message in a session together with its status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// The message itself
    pub message: ChatMessage,
    /// Current status
    #[serde(default)]
    pub status: TurnStatus,
}

impl ChatTurn {
    /// Wrap a message with a status
    pub fn new(message: ChatMessage, status: TurnStatus) -> Self {
        Self { message, status }
    }
}

/// An attachment queued for submission
///
/// Serialized in the wire shape the backend expects:
/// `{ "type": "inline", "data": ..., "mimeType": ..., "name": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Attachment kind, always `inline` for data URLs
    #[serde(rename = "type")]
    pub kind: String,
    /// Data URL or bare base64 payload
    pub data: String,
    /// MIME type of the decoded payload
    pub mime_type: String,
    /// Original file name
    pub name: String,
}

impl FileDescriptor {
    /// Create an inline attachment
    pub fn inline(
        data: impl Into<String>,
        mime_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: "inline".to_string(),
            data: data.into(),
            mime_type: mime_type.into(),
            name: name.into(),
        }
    }
}

/// One independent conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique id
    pub id: String,
    /// Display title
    pub label: String,
    /// Model or backend targeted by this session
    pub provider: String,
    /// Turns in conversation order
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    /// Attachments waiting for the next submission
    #[serde(default)]
    pub files: Vec<FileDescriptor>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session with the default label
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            label: DEFAULT_SESSION_LABEL.to_string(),
            provider: provider.into(),
            messages: Vec::new(),
            files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// True while the label has not been derived or set
    pub fn has_default_label(&self) -> bool {
        self.label == DEFAULT_SESSION_LABEL
    }

    /// The most recent user message, if any
    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .map(|turn| &turn.message)
            .find(|message| message.role == Role::User)
    }

    /// Role and content of every turn, in order
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(|turn| turn.message.clone()).collect()
    }
}

/// Read-only view of a session for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Session id
    pub id: String,
    /// Display title
    pub label: String,
    /// Targeted provider
    pub provider: String,
    /// Number of turns
    pub message_count: usize,
    /// Number of pending attachments
    pub file_count: usize,
    /// Whether a stream is writing to the session
    pub loading: bool,
    /// True for the current session
    pub is_current: bool,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

/// First `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

static LAST_SESSION_ID: AtomicI64 = AtomicI64::new(0);

/// Generate a session id from the current time in milliseconds
///
/// Ids are strictly increasing within a process even when several sessions
/// are created in the same millisecond.
pub fn next_session_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_SESSION_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_SESSION_ID.compare_exchange_weak(
            last,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate.to_string(),
            Err(actual) => last = actual,
        }
    }
}
