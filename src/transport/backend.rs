//! Streaming backend proxy client
//!
//! The backend accepts `POST /api/chat/stream` with a JSON [`ChatRequest`]
//! and answers with a `text/event-stream` body of `data: <json>` lines. It
//! also serves the model catalogue (`GET /api/chat/models`) and a provider
//! connectivity report (`GET /api/chat/test`).

use std::collections::BTreeMap;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{CopilotError, Result};
use crate::stream::ByteStream;
use crate::transport::{ChatRequest, ChatTransport};

/// One entry of the backend model catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Catalogue key, used as the session provider
    #[serde(default)]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Provider family (`openai`, `gemini`, ...)
    #[serde(default)]
    pub provider: String,
    /// Upstream model name
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: BTreeMap<String, ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ConnectionTestResponse {
    #[serde(default)]
    results: serde_json::Value,
}

/// HTTP client for the backend proxy
#[derive(Debug, Clone)]
pub struct BackendTransport {
    client: Client,
    base_url: String,
}

impl BackendTransport {
    /// Create a client for the backend at `base_url`
    ///
    /// The client has no overall timeout; a chat stream runs until it
    /// finishes, fails, or is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_sidebar::transport::BackendTransport;
    ///
    /// let backend = BackendTransport::new("http://localhost:3001/").unwrap();
    /// assert_eq!(backend.base_url(), "http://localhost:3001");
    /// ```
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("copilot-sidebar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CopilotError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch the model catalogue, sorted by id
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable, answers with a
    /// non-success status, or sends an unexpected body.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/chat/models");
        tracing::debug!("Fetching models from backend: {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::warn!("Failed to fetch backend models: {}", e);
            CopilotError::Transport(format!("Failed to connect to backend: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Backend returned error {}: {}", status, error_text);
            return Err(CopilotError::Transport(format!(
                "HTTP error! status: {}",
                status.as_u16()
            ))
            .into());
        }

        let body: ModelsResponse = response.json().await.map_err(|e| {
            CopilotError::Decode(format!("Failed to parse models response: {}", e))
        })?;

        Ok(body
            .models
            .into_iter()
            .map(|(id, mut info)| {
                info.id = id;
                info
            })
            .collect())
    }

    /// Ask the backend to test its upstream provider connections
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not success.
    pub async fn test_connections(&self) -> Result<serde_json::Value> {
        let url = self.endpoint("/api/chat/test");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CopilotError::Transport(format!("Failed to connect to backend: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CopilotError::Transport(format!(
                "HTTP error! status: {}",
                status.as_u16()
            ))
            .into());
        }

        let body: ConnectionTestResponse = response.json().await.map_err(|e| {
            CopilotError::Decode(format!("Failed to parse connection test response: {}", e))
        })?;
        Ok(body.results)
    }
}

#[async_trait::async_trait]
impl ChatTransport for BackendTransport {
    fn name(&self) -> &str {
        "backend"
    }

    async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream> {
        let url = self.endpoint("/api/chat/stream");
        tracing::debug!(
            session_id = %request.session_id,
            model = %request.model,
            history = request.conversation_history.len(),
            files = request.files.len(),
            "Opening backend stream"
        );

        let send = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(request)
            .send();

        let response = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(CopilotError::Cancelled.into()),
            result = send => result.map_err(|e| CopilotError::Transport(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "Backend rejected stream request");
            return Err(CopilotError::Transport(format!(
                "HTTP error! status: {}",
                status.as_u16()
            ))
            .into());
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| anyhow::Error::from(CopilotError::Transport(e.to_string())))
        });
        Ok(Box::pin(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let backend = BackendTransport::new("http://localhost:3001///").unwrap();
        assert_eq!(backend.base_url(), "http://localhost:3001");
        assert_eq!(
            backend.endpoint("/api/chat/stream"),
            "http://localhost:3001/api/chat/stream"
        );
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = ChatRequest {
            message: "hi".into(),
            model: "gemini-2.5-flash".into(),
            conversation_history: vec![crate::session::ChatMessage::user("earlier")],
            session_id: "42".into(),
            files: Vec::new(),
            use_fake_stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sessionId"], "42");
        assert_eq!(json["useFakeStream"], true);
        assert_eq!(json["conversationHistory"][0]["role"], "user");
        assert!(json["files"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_models_response_parses() {
        let body = r#"{"models":{"gpt-4.1-nano":{"name":"GPT 4.1 nano","provider":"openai","model":"gpt-4.1-nano"}}}"#;
        let parsed: ModelsResponse = serde_json::from_str(body).unwrap();
        let info = &parsed.models["gpt-4.1-nano"];
        assert_eq!(info.provider, "openai");
        assert_eq!(info.name, "GPT 4.1 nano");
    }

    #[tokio::test]
    async fn test_open_stream_cancelled_before_send() {
        let backend = BackendTransport::new("http://127.0.0.1:9").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let request = ChatRequest {
            message: "hi".into(),
            model: "m".into(),
            conversation_history: Vec::new(),
            session_id: "1".into(),
            files: Vec::new(),
            use_fake_stream: false,
        };
        let err = backend.open_stream(&request, token).await.err().unwrap();
        assert!(crate::error::is_cancellation(&err));
    }
}
