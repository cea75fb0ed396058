//! Direct provider transport ("frontend-only" mode)
//!
//! Calls the Gemini `streamGenerateContent` endpoint with a locally stored
//! API key and rewrites its server-sent events into the same
//! `data: {"content": ...}` line protocol the backend speaks, ending with a
//! `data: {"done": true}` line. The request carries only the message and the
//! conversation history; session ids and attachments stay local.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::DirectConfig;
use crate::error::{CopilotError, Result};
use crate::session::{ChatMessage, Role};
use crate::stream::{ByteStream, LineBuffer};
use crate::transport::{ChatRequest, ChatTransport};

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    #[serde(default)]
    message: String,
}

/// Streams replies straight from the provider API
#[derive(Debug, Clone)]
pub struct DirectProviderTransport {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl DirectProviderTransport {
    /// Create a transport from the direct-mode settings and an API key
    ///
    /// # Errors
    ///
    /// Returns [`CopilotError::MissingCredentials`] for a blank key, or an
    /// error if the HTTP client cannot be constructed.
    pub fn new(config: &DirectConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CopilotError::MissingCredentials(config.provider_family.clone()).into());
        }

        let client = Client::builder()
            .user_agent(concat!("copilot-sidebar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CopilotError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized direct provider transport: api_base={}, model={}",
            config.api_base,
            config.model
        );

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.api_base, self.model
        )
    }
}

fn provider_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn build_body<'a>(history: &'a [ChatMessage], message: &'a str) -> GenerateRequest<'a> {
    let mut contents: Vec<Content<'a>> = history
        .iter()
        .map(|m| Content {
            role: provider_role(m.role),
            parts: vec![Part { text: &m.content }],
        })
        .collect();
    contents.push(Content {
        role: "user",
        parts: vec![Part { text: message }],
    });
    GenerateRequest { contents }
}

/// Rewrite complete upstream lines into backend protocol lines
fn normalize_lines(lines: Vec<String>) -> String {
    let mut out = String::new();
    for line in lines {
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            continue;
        };
        if data.is_empty() {
            continue;
        }
        let chunk: GenerateChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed provider event");
                continue;
            }
        };

        let payload = if let Some(error) = chunk.error {
            json!({ "error": format!("Gemini API error: {}", error.message) })
        } else {
            let text: String = chunk
                .candidates
                .iter()
                .filter_map(|c| c.content.as_ref())
                .flat_map(|c| c.parts.iter())
                .filter_map(|p| p.text.as_deref())
                .collect();
            if text.is_empty() {
                continue;
            }
            json!({ "content": text })
        };
        out.push_str("data: ");
        out.push_str(&payload.to_string());
        out.push('\n');
    }
    out
}

/// Rewrite an upstream body into backend protocol, closing with a done line
///
/// A final upstream line without a trailing newline is flushed before the
/// done line. The stream ends after the first upstream error.
fn normalize_stream<S>(body: S) -> ByteStream
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let body: ByteStream = Box::pin(body);
    let state = (body, LineBuffer::new(), false);
    Box::pin(futures::stream::unfold(
        state,
        |(mut body, mut lines, finished)| async move {
            if finished {
                return None;
            }
            match body.next().await {
                Some(Ok(bytes)) => {
                    let out = normalize_lines(lines.push(&bytes));
                    Some((Ok(Bytes::from(out)), (body, lines, false)))
                }
                Some(Err(e)) => Some((Err(e), (body, lines, true))),
                None => {
                    let mut out = lines
                        .take_remainder()
                        .map(|line| normalize_lines(vec![line]))
                        .unwrap_or_default();
                    out.push_str("data: {\"done\":true}\n");
                    Some((Ok(Bytes::from(out)), (body, lines, true)))
                }
            }
        },
    ))
}

#[async_trait::async_trait]
impl ChatTransport for DirectProviderTransport {
    fn name(&self) -> &str {
        "direct"
    }

    async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream> {
        tracing::debug!(
            model = %self.model,
            history = request.conversation_history.len(),
            "Opening direct provider stream"
        );

        let body = build_body(&request.conversation_history, &request.message);
        let send = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(CopilotError::Cancelled.into()),
            result = send => result.map_err(|e| CopilotError::Provider(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GenerateChunk>(&error_text)
                .ok()
                .and_then(|c| c.error)
                .map(|e| e.message)
                .unwrap_or_else(|| format!("status {}", status.as_u16()));
            tracing::error!("Provider returned error {}: {}", status, message);
            return Err(CopilotError::Provider(message).into());
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| anyhow::Error::from(CopilotError::Provider(e.to_string())))
        });
        Ok(normalize_stream(body))
    }

    fn failure_message(&self, error: &anyhow::Error) -> String {
        format!("Gemini API error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_is_rejected() {
        let err = DirectProviderTransport::new(&DirectConfig::default(), "  ").unwrap_err();
        assert!(err.to_string().contains("Missing credentials"));
    }

    #[test]
    fn test_endpoint_uses_configured_model() {
        let config = DirectConfig {
            api_base: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        let transport = DirectProviderTransport::new(&config, "key").unwrap();
        assert_eq!(
            transport.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_history_roles_are_mapped() {
        let history = vec![ChatMessage::user("q"), ChatMessage::assistant("a")];
        let body = serde_json::to_value(build_body(&history, "next")).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "next");
    }

    #[test]
    fn test_normalize_text_chunks() {
        let lines = vec![
            r#"data: {"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"}}]}"#.to_string(),
            String::new(),
            r#"data: {"candidates":[{"finishReason":"STOP"}]}"#.to_string(),
        ];
        assert_eq!(normalize_lines(lines), "data: {\"content\":\"Hello\"}\n");
    }

    #[test]
    fn test_normalize_error_chunk() {
        let lines = vec![r#"data: {"error":{"code":400,"message":"bad key"}}"#.to_string()];
        assert_eq!(
            normalize_lines(lines),
            "data: {\"error\":\"Gemini API error: bad key\"}\n"
        );
    }

    #[tokio::test]
    async fn test_stream_flushes_unterminated_last_line() {
        let fragments: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n",
            )),
            Ok(Bytes::from_static(
                b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" there\"}]}}]}",
            )),
        ];
        let out: Vec<Bytes> = normalize_stream(futures::stream::iter(fragments))
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        let text: String = out
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
        assert_eq!(
            text,
            "data: {\"content\":\"Hi\"}\ndata: {\"content\":\" there\"}\ndata: {\"done\":true}\n"
        );
    }

    #[tokio::test]
    async fn test_stream_stops_after_upstream_error() {
        let fragments: Vec<Result<Bytes>> =
            vec![Err(CopilotError::Provider("reset".into()).into())];
        let out: Vec<Result<Bytes>> = normalize_stream(futures::stream::iter(fragments))
            .collect()
            .await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }

    #[test]
    fn test_normalize_skips_malformed() {
        assert!(normalize_lines(vec!["data: {oops".to_string()]).is_empty());
    }
}
