//! Single-session submission and the shared stream loop

use std::sync::Arc;

use futures::StreamExt;

use crate::error::{is_cancellation, CopilotError, Result};
use crate::orchestrator::{StreamOrchestrator, CANCELLED_PLACEHOLDER};
use crate::session::{AbortHandle, ChatMessage, Session, TurnStatus};
use crate::stream::{decode_stream, StreamEvent};
use crate::transport::{ChatRequest, ChatTransport};

/// Where a submission is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    /// Nothing submitted yet
    Idle,
    /// Turns added, stream being opened
    Submitting,
    /// Response body being read
    Streaming,
    /// The producer reported completion
    Completed,
    /// The request failed
    Errored,
    /// The request was aborted
    Cancelled,
}

impl SubmissionPhase {
    /// True for the three final phases
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubmissionPhase::Completed | SubmissionPhase::Errored | SubmissionPhase::Cancelled
        )
    }
}

impl std::fmt::Display for SubmissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubmissionPhase::Idle => "idle",
            SubmissionPhase::Submitting => "submitting",
            SubmissionPhase::Streaming => "streaming",
            SubmissionPhase::Completed => "completed",
            SubmissionPhase::Errored => "errored",
            SubmissionPhase::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How a submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The reply streamed to completion
    Completed,
    /// The reply failed; carries the text written into the session
    Errored(String),
    /// The request was aborted
    Cancelled,
}

impl SubmissionOutcome {
    /// Terminal phase matching this outcome
    pub fn phase(&self) -> SubmissionPhase {
        match self {
            SubmissionOutcome::Completed => SubmissionPhase::Completed,
            SubmissionOutcome::Errored(_) => SubmissionPhase::Errored,
            SubmissionOutcome::Cancelled => SubmissionPhase::Cancelled,
        }
    }
}

/// Result of one stream, single or turbo branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReport {
    /// Session the reply was written to
    pub session_id: String,
    /// Provider or model the request targeted
    pub model: String,
    /// How it ended
    pub outcome: SubmissionOutcome,
}

/// Who clears the global loading flag once a stream settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadingScope {
    /// The stream owns the flag
    Single,
    /// The fan-out clears it after every branch settled
    TurboBranch,
}

/// Everything needed to run one prepared stream
#[derive(Debug)]
pub(crate) struct PreparedStream {
    pub transport: Arc<dyn ChatTransport>,
    pub request: ChatRequest,
    pub handle: AbortHandle,
}

/// Reject blank input before anything is mutated
pub(crate) fn validate_input(input: &str) -> Result<()> {
    if input.trim().is_empty() {
        return Err(CopilotError::Validation("Message is empty".to_string()).into());
    }
    Ok(())
}

impl StreamOrchestrator {
    /// Submit `input`, fanning out when turbo mode is on
    ///
    /// # Errors
    ///
    /// Returns a validation or missing-credential error before any state
    /// changes. Stream failures are written into the session instead.
    pub async fn submit(&self, input: &str) -> Result<Vec<SubmissionReport>> {
        let turbo = self
            .state
            .read_ui(|ui| ui.turbo_mode() && !ui.selected_models().is_empty());
        if turbo {
            self.submit_turbo(input).await
        } else {
            Ok(vec![self.submit_single(input).await?])
        }
    }

    /// Submit `input` to the current session and stream the reply into it
    ///
    /// The target session id is captured up front, so switching sessions
    /// while the reply streams cannot redirect it.
    ///
    /// # Errors
    ///
    /// Returns [`CopilotError::Validation`] for blank input,
    /// [`CopilotError::SessionNotFound`] without a current session and
    /// [`CopilotError::MissingCredentials`] when a direct route has no key.
    pub async fn submit_single(&self, input: &str) -> Result<SubmissionReport> {
        validate_input(input)?;
        let (session_id, provider) = self
            .state
            .read_sessions(|store| {
                store
                    .current_session()
                    .map(|s| (s.id.clone(), s.provider.clone()))
            })
            .ok_or_else(|| CopilotError::SessionNotFound("no current session".to_string()))?;
        let (transport, direct) = self.transport_for(&provider)?;

        tracing::info!(
            submission.session_id = %session_id,
            submission.model = %provider,
            submission.transport = transport.name(),
            submission.phase = %SubmissionPhase::Submitting,
            "Submitting message"
        );

        let (history, handle, files) = self.state.update_session(&session_id, |store| {
            // The backend appends `message` itself, so history stops before it.
            let history = store
                .session(&session_id)
                .map(Session::history)
                .unwrap_or_default();
            store.add_message(&session_id, ChatMessage::user(input), TurnStatus::Done);
            store.set_session_loading(&session_id, true);
            store.add_message(&session_id, ChatMessage::assistant(""), TurnStatus::Loading);
            let handle = store.obtain_abort_handle(&session_id);
            let files = if direct {
                Vec::new()
            } else {
                store.session_files(&session_id)
            };
            (history, handle, files)
        });
        self.state.update_ui(|ui| {
            ui.clear_input();
            ui.set_loading(true);
        });

        let request = ChatRequest {
            message: input.to_string(),
            model: provider.clone(),
            conversation_history: history,
            session_id: session_id.clone(),
            files,
            use_fake_stream: self.settings.use_fake_stream,
        };
        let prepared = PreparedStream {
            transport,
            request,
            handle,
        };
        let outcome = self.run_stream(prepared, LoadingScope::Single).await;

        Ok(SubmissionReport {
            session_id,
            model: provider,
            outcome,
        })
    }

    /// Open and drain one stream, then apply its terminal transition
    pub(crate) async fn run_stream(
        &self,
        prepared: PreparedStream,
        scope: LoadingScope,
    ) -> SubmissionOutcome {
        let PreparedStream {
            transport,
            request,
            handle,
        } = prepared;
        let session_id = request.session_id.clone();
        let token = handle.token();

        let outcome = match transport.open_stream(&request, token.clone()).await {
            Err(e) if is_cancellation(&e) => SubmissionOutcome::Cancelled,
            Err(e) => {
                tracing::error!(
                    submission.session_id = %session_id,
                    submission.error = %e,
                    "Failed to open stream"
                );
                SubmissionOutcome::Errored(transport.failure_message(&e))
            }
            Ok(body) => {
                tracing::debug!(
                    submission.session_id = %session_id,
                    submission.phase = %SubmissionPhase::Streaming,
                    "Stream opened"
                );
                let mut events = decode_stream(body, token);
                let mut outcome = SubmissionOutcome::Completed;
                while let Some(event) = events.next().await {
                    match event {
                        StreamEvent::ContentDelta { text, first_chunk } => {
                            if first_chunk {
                                tracing::debug!(
                                    submission.session_id = %session_id,
                                    "First chunk received"
                                );
                            }
                            self.state.update_session(&session_id, |store| {
                                store.append_to_last_message(&session_id, &text)
                            });
                        }
                        StreamEvent::Done => {
                            outcome = SubmissionOutcome::Completed;
                            break;
                        }
                        StreamEvent::Error(message) => {
                            outcome = SubmissionOutcome::Errored(format!("Error: {}", message));
                            break;
                        }
                        StreamEvent::Cancelled => {
                            outcome = SubmissionOutcome::Cancelled;
                            break;
                        }
                    }
                }
                outcome
            }
        };

        self.finish_stream(&session_id, &outcome, scope).await;
        outcome
    }

    /// Apply a terminal outcome to the session and the UI
    pub(crate) async fn finish_stream(
        &self,
        session_id: &str,
        outcome: &SubmissionOutcome,
        scope: LoadingScope,
    ) {
        let is_current = self.state.update_session(session_id, |store| {
            match outcome {
                SubmissionOutcome::Completed => {}
                SubmissionOutcome::Errored(message) => {
                    store.update_last_message(session_id, message);
                }
                SubmissionOutcome::Cancelled => {
                    let empty = store
                        .session(session_id)
                        .and_then(|s| s.messages.last())
                        .map(|turn| turn.message.content.is_empty())
                        .unwrap_or(false);
                    if empty {
                        store.update_last_message(session_id, CANCELLED_PLACEHOLDER);
                    }
                }
            }
            store.update_last_message_status(session_id, TurnStatus::Done);
            store.set_session_loading(session_id, false);
            store.clear_session_files(session_id);
            store.current_session_id() == Some(session_id)
        });

        self.state.update_ui(|ui| {
            if scope == LoadingScope::Single {
                ui.set_loading(false);
            }
            if is_current {
                ui.clear_screenshot_data();
                ui.set_current_session_files(Vec::new());
            }
        });

        match outcome {
            SubmissionOutcome::Errored(message) => {
                tracing::warn!(
                    submission.session_id = %session_id,
                    submission.phase = %outcome.phase(),
                    submission.error = %message,
                    "Submission failed"
                );
                self.notifier.error(message);
            }
            _ => {
                tracing::info!(
                    submission.session_id = %session_id,
                    submission.phase = %outcome.phase(),
                    "Submission finished"
                );
            }
        }

        self.persist().await;
    }
}
