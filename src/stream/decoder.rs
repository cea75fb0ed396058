//! Line-buffered decoder for the `data: <json>` event protocol
//!
//! Transports hand the decoder opaque fragments in arrival order. The
//! decoder reassembles complete lines (a fragment boundary may fall anywhere,
//! including inside a multi-byte character), parses each `data:` payload and
//! emits typed [`StreamEvent`]s. Once an `Error` or `Done` event has been
//! produced the decoder is finished and ignores any further input.

use serde::Deserialize;
use serde_json::Value;

/// A decoded unit from an incremental response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A non-empty piece of assistant content
    ///
    /// `first_chunk` is true on the first delta of a stream only, so callers
    /// can drop a "thinking" indicator exactly once.
    ContentDelta {
        /// Text to append to the assistant turn
        text: String,
        /// True for the first content delta of the stream
        first_chunk: bool,
    },
    /// The producer reported a failure; terminal
    Error(String),
    /// The producer finished normally; terminal
    Done,
    /// The caller aborted the request; terminal
    ///
    /// Never produced by [`StreamDecoder`] itself, only by the
    /// cancellation-aware reader in [`crate::stream::reader`].
    Cancelled,
}

impl StreamEvent {
    /// Returns true for events after which no more events follow
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::ContentDelta { .. })
    }
}

/// Accumulates raw bytes and yields complete lines
///
/// Splitting happens on `\n` at the byte level, which never falls inside a
/// UTF-8 sequence, so partial characters simply wait in the buffer. A
/// trailing `\r` is stripped from each line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and drain every complete line
    pub fn push(&mut self, fragment: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(fragment);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Take whatever partial line is still buffered
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
        Some(text)
    }

    /// Returns true when no partial line is held back
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    error: Option<Value>,
}

/// Stateful decoder turning fragments into [`StreamEvent`]s
///
/// # Examples
///
/// ```
/// use copilot_sidebar::stream::{StreamDecoder, StreamEvent};
///
/// let mut decoder = StreamDecoder::new();
/// assert!(decoder.push(b"data: {\"content\":\"ab").is_empty());
/// let events = decoder.push(b"c\"}\n");
/// assert_eq!(
///     events,
///     vec![StreamEvent::ContentDelta { text: "abc".into(), first_chunk: true }]
/// );
/// ```
#[derive(Debug, Default)]
pub struct StreamDecoder {
    lines: LineBuffer,
    seen_content: bool,
    finished: bool,
}

impl StreamDecoder {
    /// Create a decoder with an empty line buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment and return the events completed by it
    pub fn push(&mut self, fragment: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let lines = self.lines.push(fragment);
        self.decode_lines(lines)
    }

    /// Flush a final line that arrived without a trailing newline
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        match self.lines.take_remainder() {
            Some(line) => self.decode_lines(vec![line]),
            None => Vec::new(),
        }
    }

    /// Returns true once a terminal event has been emitted
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn decode_lines(&mut self, lines: Vec<String>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in lines {
            if let Some(event) = self.decode_line(&line) {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    self.finished = true;
                    break;
                }
            }
        }
        events
    }

    fn decode_line(&mut self, line: &str) -> Option<StreamEvent> {
        let data = line.strip_prefix("data:")?.trim_start();
        if data.is_empty() {
            return None;
        }

        let payload: StreamPayload = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, line = %data, "Skipping malformed stream line");
                return None;
            }
        };

        if let Some(message) = payload.error.as_ref().and_then(error_message) {
            return Some(StreamEvent::Error(message));
        }

        if payload.done == Some(true) {
            return Some(StreamEvent::Done);
        }

        match payload.content {
            Some(text) if !text.is_empty() => {
                let first_chunk = !self.seen_content;
                self.seen_content = true;
                if first_chunk {
                    tracing::debug!("First content chunk received");
                }
                Some(StreamEvent::ContentDelta { text, first_chunk })
            }
            _ => None,
        }
    }
}

/// Render an `error` field; null, false and empty strings do not count
fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}
