//! Turbo fan-out: one prompt, one fresh session per selected model

use std::collections::BTreeMap;
use std::time::Instant;

use futures::future::join_all;
use rand::Rng;

use crate::error::{CopilotError, Result};
use crate::orchestrator::submission::{
    validate_input, LoadingScope, PreparedStream, SubmissionOutcome, SubmissionReport,
};
use crate::orchestrator::StreamOrchestrator;
use crate::session::{ChatMessage, TurnStatus};
use crate::transport::ChatRequest;

const TURBO_ID_SUFFIX_LEN: usize = 9;

/// Id for a turbo session: `turbo-<model>-<unix millis>-<random suffix>`
///
/// # Examples
///
/// ```
/// use copilot_sidebar::orchestrator::turbo_session_id;
///
/// let id = turbo_session_id("gpt-4o-mini");
/// assert!(id.starts_with("turbo-gpt-4o-mini-"));
/// assert_ne!(id, turbo_session_id("gpt-4o-mini"));
/// ```
pub fn turbo_session_id(model: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(TURBO_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!(
        "turbo-{}-{}-{}",
        model,
        chrono::Utc::now().timestamp_millis(),
        suffix
    )
}

impl StreamOrchestrator {
    /// Send `input` to every selected model in parallel
    ///
    /// Each model gets a new session holding only this prompt; the current
    /// session is untouched. Branches settle independently and the global
    /// loading flag is cleared once all of them have.
    ///
    /// # Errors
    ///
    /// Returns [`CopilotError::Validation`] for blank input or an empty model
    /// selection, and [`CopilotError::MissingCredentials`] when any model
    /// needs a direct route that has no key. Nothing is mutated in that case.
    pub async fn submit_turbo(&self, input: &str) -> Result<Vec<SubmissionReport>> {
        validate_input(input)?;
        let models = self.state.read_ui(|ui| ui.selected_models().to_vec());
        if models.is_empty() {
            return Err(
                CopilotError::Validation("No models selected for turbo mode".to_string()).into(),
            );
        }
        let routes = models
            .iter()
            .map(|model| self.transport_for(model).map(|(transport, _)| (model.clone(), transport)))
            .collect::<Result<Vec<_>>>()?;

        let start = Instant::now();
        tracing::info!(
            turbo.event = "start",
            turbo.model_count = models.len(),
            "Starting turbo submission"
        );

        self.state.update_ui(|ui| {
            ui.set_turbo_mode_expanded(true);
            ui.clear_input();
        });

        let turbo_sessions: BTreeMap<String, String> = self.state.update_sessions(|store| {
            models
                .iter()
                .map(|model| {
                    let id = turbo_session_id(model);
                    store.add_session(&id, model);
                    store.add_message(&id, ChatMessage::user(input), TurnStatus::Done);
                    (model.clone(), id)
                })
                .collect()
        });
        self.state.update_ui(|ui| {
            ui.set_turbo_sessions(turbo_sessions.clone());
            ui.set_loading(true);
        });

        let mut branches = Vec::with_capacity(routes.len());
        for (model, transport) in routes {
            let Some(session_id) = turbo_sessions.get(&model).cloned() else {
                continue;
            };
            let handle = self.state.update_session(&session_id, |store| {
                store.set_session_loading(&session_id, true);
                store.add_message(&session_id, ChatMessage::assistant(""), TurnStatus::Loading);
                store.obtain_abort_handle(&session_id)
            });
            let request = ChatRequest {
                message: input.to_string(),
                model: model.clone(),
                conversation_history: Vec::new(),
                session_id: session_id.clone(),
                files: Vec::new(),
                use_fake_stream: self.settings.use_fake_stream,
            };
            branches.push((
                model,
                session_id,
                PreparedStream {
                    transport,
                    request,
                    handle,
                },
            ));
        }

        let mut labels = Vec::with_capacity(branches.len());
        let mut task_handles = Vec::with_capacity(branches.len());
        for (model, session_id, prepared) in branches {
            let orchestrator = self.clone();
            labels.push((model, session_id));
            task_handles.push(tokio::spawn(async move {
                orchestrator
                    .run_stream(prepared, LoadingScope::TurboBranch)
                    .await
            }));
        }

        let mut reports = Vec::with_capacity(labels.len());
        for ((model, session_id), task_result) in labels.into_iter().zip(join_all(task_handles).await)
        {
            let outcome = match task_result {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        turbo.event = "branch_panic",
                        turbo.model = %model,
                        turbo.error = %e,
                        "Turbo branch panicked"
                    );
                    let outcome = SubmissionOutcome::Errored(format!("Error: {}", e));
                    self.finish_stream(&session_id, &outcome, LoadingScope::TurboBranch)
                        .await;
                    outcome
                }
            };
            reports.push(SubmissionReport {
                session_id,
                model,
                outcome,
            });
        }

        self.state.update_ui(|ui| ui.set_loading(false));
        self.persist().await;

        let completed = reports
            .iter()
            .filter(|r| r.outcome == SubmissionOutcome::Completed)
            .count();
        tracing::info!(
            turbo.event = "complete",
            turbo.completed = completed,
            turbo.failed = reports.len() - completed,
            turbo.duration_ms = start.elapsed().as_millis() as u64,
            "Turbo submission settled"
        );

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::notify::NotificationLevel;
    use crate::orchestrator::tests::{current_id, harness};
    use crate::session::Role;
    use crate::transport::fake::{Script, ScriptedTransport};

    fn select(h: &crate::orchestrator::tests::Harness, models: &[&str]) {
        h.orchestrator.state().update_ui(|ui| {
            ui.set_selected_models(models.iter().map(|m| m.to_string()).collect())
        });
    }

    #[test]
    fn test_turbo_session_id_format() {
        let id = turbo_session_id("A");
        let parts: Vec<&str> = id.splitn(4, '-').collect();
        assert_eq!(parts[0], "turbo");
        assert_eq!(parts[1], "A");
        assert!(parts[2].parse::<i64>().is_ok());
        assert_eq!(parts[3].len(), TURBO_ID_SUFFIX_LEN);
        assert!(parts[3].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_turbo_session_ids_do_not_collide() {
        let ids: HashSet<String> = (0..200).map(|_| turbo_session_id("m")).collect();
        assert_eq!(ids.len(), 200);
    }

    #[tokio::test]
    async fn test_turbo_creates_isolated_sessions() {
        let h = harness(
            ScriptedTransport::new()
                .with_script("A", Script::reply(&["from A"]))
                .with_script("B", Script::reply(&["from B"])),
        );
        let current = current_id(&h.orchestrator);
        h.orchestrator.state().update_session(&current, |s| {
            s.add_message(&current, ChatMessage::user("earlier"), TurnStatus::Done)
        });
        select(&h, &["A", "B"]);
        assert!(h.orchestrator.state().read_ui(|ui| ui.turbo_mode()));

        let reports = h.orchestrator.submit("compare").await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(current_id(&h.orchestrator), current);
        h.orchestrator.state().read_sessions(|s| {
            assert_eq!(s.total_sessions(), 3);
            assert_eq!(s.session(&current).unwrap().messages.len(), 1);
            for report in &reports {
                let session = s.session(&report.session_id).unwrap();
                assert_eq!(session.provider, report.model);
                assert_eq!(session.messages.len(), 2);
                assert_eq!(session.messages[0].message, ChatMessage::user("compare"));
                assert_eq!(session.messages[1].message.role, Role::Assistant);
                assert_eq!(
                    session.messages[1].message.content,
                    format!("from {}", report.model)
                );
            }
        });
        h.orchestrator.state().read_ui(|ui| {
            assert!(!ui.loading());
            assert!(ui.turbo_mode_expanded());
            assert_eq!(ui.turbo_sessions().len(), 2);
        });

        for request in h.transport.requests() {
            assert!(request.conversation_history.is_empty());
            assert!(request.files.is_empty());
        }
    }

    #[tokio::test]
    async fn test_failing_branch_does_not_affect_siblings() {
        let h = harness(
            ScriptedTransport::new()
                .with_script("A", Script::FailOpen("boom".into()))
                .with_script("B", Script::reply(&["fine"])),
        );
        select(&h, &["A", "B"]);

        let reports = h.orchestrator.submit("go").await.unwrap();

        let by_model: BTreeMap<_, _> = reports
            .iter()
            .map(|r| (r.model.as_str(), r.clone()))
            .collect();
        assert!(matches!(by_model["A"].outcome, SubmissionOutcome::Errored(_)));
        assert_eq!(by_model["B"].outcome, SubmissionOutcome::Completed);
        h.orchestrator.state().read_sessions(|s| {
            let b = s.session(&by_model["B"].session_id).unwrap();
            assert_eq!(b.messages[1].message.content, "fine");
            assert!(!s.session_loading(&by_model["A"].session_id));
        });
        assert_eq!(h.notifier.messages(NotificationLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_cancelling_one_branch_leaves_others_running() {
        let h = harness(
            ScriptedTransport::new()
                .with_script("A", Script::Hang(Vec::new()))
                .with_script("B", Script::Hang(Vec::new())),
        );
        select(&h, &["A", "B"]);

        let orchestrator = h.orchestrator.clone();
        let task = tokio::spawn(async move { orchestrator.submit("go").await });

        let mut waited = 0;
        while h.transport.requests().len() < 2 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            waited += 1;
            assert!(waited < 400, "branches never started");
        }
        let (a, b) = h.orchestrator.state().read_ui(|ui| {
            (
                ui.turbo_session_for("A").unwrap().to_string(),
                ui.turbo_session_for("B").unwrap().to_string(),
            )
        });

        assert!(h.orchestrator.cancel_session(&a));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        h.orchestrator.state().read_sessions(|s| {
            assert!(!s.session_loading(&a));
            assert!(s.session_loading(&b));
        });
        assert!(h.orchestrator.state().read_ui(|ui| ui.loading()));

        h.orchestrator.cancel_session(&b);
        let reports = task.await.unwrap().unwrap();
        assert!(reports
            .iter()
            .all(|r| r.outcome == SubmissionOutcome::Cancelled));
        assert!(!h.orchestrator.state().read_ui(|ui| ui.loading()));
        assert!(h.notifier.messages(NotificationLevel::Error).is_empty());
    }

    #[tokio::test]
    async fn test_turbo_without_models_is_rejected() {
        let h = harness(ScriptedTransport::new());
        let before = h.orchestrator.state().read_sessions(|s| s.total_sessions());
        assert!(h.orchestrator.submit_turbo("go").await.is_err());
        assert_eq!(
            h.orchestrator.state().read_sessions(|s| s.total_sessions()),
            before
        );
    }
}
