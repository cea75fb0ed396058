//! Scripted in-process transport for unit tests
//!
//! Each model name maps to a [`Script`] describing how its stream behaves.
//! Every request is recorded so tests can assert on what was sent.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{CopilotError, Result};
use crate::stream::ByteStream;
use crate::transport::{ChatRequest, ChatTransport};

/// Behaviour of one scripted stream
#[derive(Debug, Clone)]
pub enum Script {
    /// Emit these fragments, then end the body
    Fragments(Vec<String>),
    /// Fail while opening the stream
    FailOpen(String),
    /// Fail opening with the cancellation error
    CancelOpen,
    /// Emit these fragments, then fail mid-read
    FailAfter(Vec<String>, String),
    /// Emit these fragments, then never finish
    Hang(Vec<String>),
}

impl Script {
    /// A well-formed reply made of content deltas and a done line
    pub fn reply(chunks: &[&str]) -> Self {
        let mut fragments: Vec<String> = chunks
            .iter()
            .map(|c| format!("data: {}\n\n", serde_json::json!({ "content": c })))
            .collect();
        fragments.push("data: {\"done\":true}\n\n".to_string());
        Script::Fragments(fragments)
    }
}

/// Transport that replays scripts keyed by model name
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: HashMap<String, Script>,
    fallback: Option<Script>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    /// Create a transport with no scripts
    pub fn new() -> Self {
        Self::default()
    }

    /// Script used for `model`
    pub fn with_script(mut self, model: &str, script: Script) -> Self {
        self.scripts.insert(model.to_string(), script);
        self
    }

    /// Script used for models without their own script
    pub fn with_fallback(mut self, script: Script) -> Self {
        self.fallback = Some(script);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

fn fragments(parts: Vec<String>) -> impl futures::Stream<Item = Result<Bytes>> + Send {
    futures::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
}

#[async_trait::async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if cancel.is_cancelled() {
            return Err(CopilotError::Cancelled.into());
        }

        let script = self
            .scripts
            .get(&request.model)
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or_else(|| Script::reply(&["ok"]));

        match script {
            Script::Fragments(parts) => Ok(Box::pin(fragments(parts))),
            Script::FailOpen(message) => Err(CopilotError::Transport(message).into()),
            Script::CancelOpen => Err(CopilotError::Cancelled.into()),
            Script::FailAfter(parts, message) => Ok(Box::pin(fragments(parts).chain(
                futures::stream::once(async move {
                    Err(anyhow::Error::from(CopilotError::Transport(message)))
                }),
            ))),
            Script::Hang(parts) => Ok(Box::pin(
                fragments(parts).chain(futures::stream::pending()),
            )),
        }
    }
}
