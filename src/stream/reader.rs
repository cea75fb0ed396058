//! Cancellation-aware read loop over a transport byte stream
//!
//! [`decode_stream`] drives a [`StreamDecoder`] from a pinned byte stream
//! and observes a [`CancellationToken`] at every read. Once the token fires
//! the pending read is dropped, [`StreamEvent::Cancelled`] is yielded and no
//! further reads are issued.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{is_cancellation, Result};
use crate::stream::decoder::{StreamDecoder, StreamEvent};

/// Raw response body as produced by a transport
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Decoded events, always ending in exactly one terminal event
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

struct ReaderState {
    bytes: ByteStream,
    decoder: StreamDecoder,
    queued: VecDeque<StreamEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl ReaderState {
    fn enqueue(&mut self, events: Vec<StreamEvent>) {
        for event in events {
            let terminal = event.is_terminal();
            self.queued.push_back(event);
            if terminal {
                self.finished = true;
                break;
            }
        }
    }

    fn terminate(&mut self, event: StreamEvent) -> StreamEvent {
        self.queued.clear();
        self.finished = true;
        event
    }
}

/// Turn a transport byte stream into a finite stream of events
///
/// The returned stream ends after its first terminal event:
///
/// - `Done` / `Error` when the decoder sees them
/// - `Error` when the transport fails mid-read
/// - `Cancelled` when `cancel` fires, or the transport reports cancellation
/// - `Done` when the body ends without an explicit terminal line
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use futures::StreamExt;
/// use copilot_sidebar::stream::{decode_stream, StreamEvent};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let body = futures::stream::iter(vec![Ok(Bytes::from_static(b"data: {\"done\":true}\n"))]);
/// let events: Vec<_> = decode_stream(Box::pin(body), CancellationToken::new()).collect().await;
/// assert_eq!(events, vec![StreamEvent::Done]);
/// # }
/// ```
pub fn decode_stream(bytes: ByteStream, cancel: CancellationToken) -> EventStream {
    let state = ReaderState {
        bytes,
        decoder: StreamDecoder::new(),
        queued: VecDeque::new(),
        cancel,
        finished: false,
    };

    let events = futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.cancel.is_cancelled() && !state.queued.is_empty() {
                let event = state.terminate(StreamEvent::Cancelled);
                return Some((event, state));
            }
            if let Some(event) = state.queued.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            let next = tokio::select! {
                biased;

                _ = state.cancel.cancelled() => None,
                chunk = state.bytes.next() => Some(chunk),
            };

            match next {
                None => {
                    tracing::debug!("Stream read cancelled");
                    let event = state.terminate(StreamEvent::Cancelled);
                    return Some((event, state));
                }
                Some(Some(Ok(chunk))) => {
                    let events = state.decoder.push(&chunk);
                    state.enqueue(events);
                }
                Some(Some(Err(e))) => {
                    let event = if is_cancellation(&e) {
                        StreamEvent::Cancelled
                    } else {
                        tracing::error!(error = %e, "Stream read failed");
                        StreamEvent::Error(e.to_string())
                    };
                    let event = state.terminate(event);
                    return Some((event, state));
                }
                Some(None) => {
                    let events = state.decoder.finish();
                    state.enqueue(events);
                    if !state.finished {
                        tracing::debug!("Stream ended without a terminal line");
                        state.queued.push_back(StreamEvent::Done);
                        state.finished = true;
                    }
                }
            }
        }
    });

    Box::pin(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopilotError;

    fn body(parts: Vec<&'static str>) -> ByteStream {
        Box::pin(futures::stream::iter(
            parts
                .into_iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        ))
    }

    #[tokio::test]
    async fn test_events_arrive_in_order_and_stop_at_done() {
        let stream = body(vec![
            "data: {\"content\":\"Hel",
            "lo\"}\n\ndata: {\"content\":\" world\"}\n\n",
            "data: {\"done\":true}\n\ndata: {\"content\":\"ignored\"}\n",
        ]);
        let events: Vec<_> = decode_stream(stream, CancellationToken::new()).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta {
                    text: "Hello".into(),
                    first_chunk: true
                },
                StreamEvent::ContentDelta {
                    text: " world".into(),
                    first_chunk: false
                },
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_eof_without_done_is_done() {
        let stream = body(vec!["data: {\"content\":\"x\"}\n"]);
        let events: Vec<_> = decode_stream(stream, CancellationToken::new()).collect().await;
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_becomes_error_event() {
        let stream: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"content\":\"x\"}\n")),
            Err(CopilotError::Transport("connection reset".into()).into()),
        ]));
        let events: Vec<_> = decode_stream(stream, CancellationToken::new()).collect().await;
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Error("Transport error: connection reset".into()))
        );
    }

    #[tokio::test]
    async fn test_transport_cancellation_error_becomes_cancelled() {
        let stream: ByteStream = Box::pin(futures::stream::iter(vec![Err(
            CopilotError::Cancelled.into(),
        )]));
        let events: Vec<_> = decode_stream(stream, CancellationToken::new()).collect().await;
        assert_eq!(events, vec![StreamEvent::Cancelled]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_read() {
        let hanging: ByteStream = Box::pin(
            futures::stream::iter(vec![Ok(Bytes::from_static(b"data: {\"content\":\"a\"}\n"))])
                .chain(futures::stream::pending()),
        );
        let token = CancellationToken::new();
        let mut events = decode_stream(hanging, token.clone());

        assert!(matches!(
            events.next().await,
            Some(StreamEvent::ContentDelta { .. })
        ));
        token.cancel();
        assert_eq!(events.next().await, Some(StreamEvent::Cancelled));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_reads_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let stream = body(vec!["data: {\"content\":\"x\"}\n"]);
        let events: Vec<_> = decode_stream(stream, token).collect().await;
        assert_eq!(events, vec![StreamEvent::Cancelled]);
    }
}
