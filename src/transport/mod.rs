//! Outbound chat transports
//!
//! A [`ChatTransport`] opens one response stream per request and hands back
//! the raw body as a [`ByteStream`] speaking the `data: <json>` line
//! protocol. Implementations:
//!
//! - [`backend::BackendTransport`] -- the streaming backend proxy, also
//!   exposing the model catalogue and connection test endpoints.
//! - [`direct::DirectProviderTransport`] -- calls the provider API directly
//!   and normalises its events into the same line protocol.
//! - [`fake::ScriptedTransport`] -- scripted in-process fake (cfg(test)
//!   only).
//!
//! [`health::HealthChecker`] is the connectivity probe used before enabling
//! the direct-mode setup prompt.

pub mod backend;
pub mod direct;
#[cfg(test)]
pub mod fake;
pub mod health;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::session::{ChatMessage, FileDescriptor};
use crate::stream::ByteStream;

pub use backend::{BackendTransport, ModelInfo};
pub use direct::DirectProviderTransport;
pub use health::{ConnectionStatus, HealthChecker};

/// Request body sent to the backend for one streamed reply
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user input being submitted
    pub message: String,
    /// Provider or model name
    pub model: String,
    /// Prior turns of the target session
    pub conversation_history: Vec<ChatMessage>,
    /// Session the reply belongs to, captured at submission time
    pub session_id: String,
    /// Attachments forwarded with the message
    pub files: Vec<FileDescriptor>,
    /// Ask the backend for a canned stream
    pub use_fake_stream: bool,
}

/// Opens streamed replies
///
/// Implementations must observe `cancel` while the request is being sent and
/// return [`crate::error::CopilotError::Cancelled`] when it fires; the
/// returned body is read under the same token by
/// [`crate::stream::decode_stream`].
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync + std::fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Send `request` and return the response body
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be sent, the peer answers
    /// with a non-success status, or `cancel` fires first.
    async fn open_stream(&self, request: &ChatRequest, cancel: CancellationToken)
        -> Result<ByteStream>;

    /// Text written into the session when `open_stream` fails
    fn failure_message(&self, error: &anyhow::Error) -> String {
        format!("Failed to connect to backend: {}", error)
    }
}
