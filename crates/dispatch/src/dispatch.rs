//! Participant state machine (C8): the nine ordered dispatch rules run
//! against every observed participant snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ceremony_core::{timefmt::format_duration_ms, Circuit, Participant, StatusSink};
use ceremony_coordination::CoordinationAdapter;
use ceremony_finalize::Finalizer;
use ceremony_pipeline::ContributionPipeline;
use ceremony_queue::observe_until_first_in_queue;
use tokio::task::JoinHandle;

use crate::error::DispatchError;
use crate::predicates::Predicates;

/// Sleep after rule 1's progression callable, giving the server's document
/// a moment to settle before the next snapshot is expected.
const POST_PROGRESSION_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Keep the participant subscription alive.
    Continue,
    /// Unsubscribe: either the ceremony is finished for this participant,
    /// or an unrecoverable invariant was violated.
    Terminate,
}

pub struct DispatchContext {
    pub coordination: Arc<dyn CoordinationAdapter>,
    pub pipeline: Arc<ContributionPipeline>,
    pub finalizer: Arc<Finalizer>,
    pub sink: Arc<dyn StatusSink>,
    pub ceremony_id: String,
    pub ceremony_prefix: String,
    pub ceremony_name: String,
    pub contributor_id: String,
    pub oauth_token: String,
    /// The queue observer currently attached, keyed by the circuit it is
    /// watching. At-least-once snapshot delivery means rule 4 sees the same
    /// WAITING state redelivered repeatedly; this guard ensures at most one
    /// observer task is live at a time instead of spawning a fresh one (and
    /// a fresh last-reported-position cache) on every redelivery.
    pub queue_observer: Mutex<Option<(String, JoinHandle<()>)>>,
}

/// Run the nine dispatch rules against one snapshot. Multiple rules may
/// fire; their side effects are independent except rules 3/4 (mutually
/// exclusive) and rule 9 (terminates the subscription).
pub async fn dispatch_snapshot(
    ctx: &DispatchContext,
    prev: Option<&Participant>,
    current: &Participant,
    circuits: &[Circuit],
) -> Result<DispatchOutcome, DispatchError> {
    let predicates = Predicates::compute(prev, current, circuits);

    // Rule 1.
    if current.status == ceremony_core::ParticipantStatus::Waiting
        && current.contribution_step.is_none()
        && current.contributions.is_empty()
        && current.contribution_progress == 0
    {
        ctx.coordination.progress_to_next_circuit_for_contribution(&ctx.ceremony_id).await?;
        tokio::time::sleep(POST_PROGRESSION_DELAY).await;
    }

    // Rule 2: bind the current circuit.
    let circuit = current.current_circuit(circuits);

    // Rules 3/4 are mutually exclusive.
    if predicates.is_current_contributor && predicates.has_resumable_step && predicates.starting_or_resuming_contribution {
        let circuit = circuit.ok_or_else(|| {
            DispatchError::InvariantViolation(format!("no circuit bound at progress={}", current.contribution_progress))
        })?;
        let temp_parts = current.temp_contribution_data.as_ref().map(|t| t.parts.clone());
        ctx.pipeline
            .run_or_resume(
                &ctx.ceremony_id,
                &ctx.ceremony_prefix,
                circuit,
                current.contribution_step,
                temp_parts,
                &ctx.contributor_id,
            )
            .await?;
    } else if predicates.is_waiting {
        if let Some(circuit) = circuit {
            let mut guard = ctx.queue_observer.lock().unwrap();
            let already_live = matches!(guard.as_ref(), Some((id, handle)) if id == &circuit.id && !handle.is_finished());

            if !already_live {
                if let Some((_, stale_handle)) = guard.take() {
                    stale_handle.abort();
                }

                let coordination = ctx.coordination.clone();
                let sink = ctx.sink.clone();
                let ceremony_id = ctx.ceremony_id.clone();
                let circuit_id = circuit.id.clone();
                let contributor_id = ctx.contributor_id.clone();
                let handle = tokio::spawn(async move {
                    observe_until_first_in_queue(coordination, &ceremony_id, &circuit_id, &contributor_id, sink.as_ref()).await;
                });
                *guard = Some((circuit.id.clone(), handle));
            }
        }
    }

    // Rule 5.
    if predicates.is_current_contributor
        && current.contribution_step == Some(ceremony_core::ContributionStep::Verifying)
        && prev.map(|p| p.contribution_step) == Some(current.contribution_step)
    {
        ctx.sink.info("resuming verification");
    }

    // Rule 6.
    let status_unchanged = prev.map(|p| p.status) == Some(current.status);
    if predicates.progress_to_next
        && status_unchanged
        && matches!(current.status, ceremony_core::ParticipantStatus::Done | ceremony_core::ParticipantStatus::Contributed)
    {
        emit_last_verification_result(current, ctx.sink.as_ref());
    }

    // Rule 7.
    if predicates.timeout_triggered_while_contributing {
        let active = ctx.coordination.get_active_timeouts(&ctx.ceremony_id, &ctx.contributor_id).await?;
        if active.len() != 1 {
            ctx.sink.info(&format!("invariant violation: expected exactly one active timeout, found {}", active.len()));
            return Ok(DispatchOutcome::Terminate);
        }
        let now_ms = chrono::Utc::now().timestamp_millis();
        let remaining = active[0].end_date_ms - now_ms;
        ctx.sink.info(&format!("timed out; resumes in {}", format_duration_ms(remaining)));
    }

    // Rule 8.
    if predicates.completed_contribution || predicates.timeout_expired {
        if predicates.completed_contribution {
            emit_last_verification_result(current, ctx.sink.as_ref());
        }

        let next_circuit_index = if predicates.completed_contribution {
            current.contribution_progress as usize
        } else {
            (current.contribution_progress as usize).saturating_sub(1)
        };
        if let Some(next) = circuits.get(next_circuit_index) {
            tracing::debug!(circuit = %next.id, "advancing to next circuit");
        }

        if predicates.completed_contribution {
            ctx.coordination.progress_to_next_circuit_for_contribution(&ctx.ceremony_id).await?;
        } else {
            ctx.coordination.resume_contribution_after_timeout_expiration(&ctx.ceremony_id).await?;
        }
    }

    // Rule 9.
    if predicates.already_contributed_to_every_circuit {
        let share_ref = ctx
            .finalizer
            .handle_public_attestation(&ctx.ceremony_name, &ctx.contributor_id, circuits, &current.contributions, &ctx.oauth_token)
            .await?;
        ctx.sink.attestation("contribution attested", &share_ref);
        return Ok(DispatchOutcome::Terminate);
    }

    Ok(DispatchOutcome::Continue)
}

fn emit_last_verification_result(current: &Participant, sink: &dyn StatusSink) {
    match current.contributions.last() {
        Some(contribution) => match contribution.valid {
            Some(true) => sink.info("contribution verified: valid"),
            Some(false) => sink.info("contribution verified: invalid"),
            None => sink.info("contribution submitted; verification pending"),
        },
        None => sink.info("no contribution record to report"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ceremony_core::{
        AvgTimings, Contribution, ParticipantStatus, RecordingStatusSink, TimeoutRecord, WaitingQueue,
    };
    use ceremony_coordination::FakeCoordinationAdapter;
    use ceremony_finalize::{AttestationPublisher, FinalizeError, PublishedBlob};
    use ceremony_pipeline::FakeZkeyContributor;
    use ceremony_storage::FakeStorageAdapter;

    struct StubPublisher {
        captured_text: std::sync::Mutex<Option<String>>,
    }

    impl StubPublisher {
        fn new() -> Self {
            Self { captured_text: std::sync::Mutex::new(None) }
        }
    }

    #[async_trait]
    impl AttestationPublisher for StubPublisher {
        async fn publish(&self, text: &str, _token: &str) -> Result<PublishedBlob, FinalizeError> {
            *self.captured_text.lock().unwrap() = Some(text.to_string());
            Ok(PublishedBlob { id: "abc123".into(), html_url: "https://paste.example/abc123".into() })
        }
    }

    fn one_circuit(current_contributor: Option<&str>) -> Circuit {
        Circuit {
            id: "c1".into(),
            sequence_position: 1,
            prefix: "circuit_a".into(),
            avg_timings: AvgTimings::default(),
            waiting_queue: WaitingQueue {
                current_contributor: current_contributor.map(String::from),
                contributors: vec![],
                completed_contributions: 0,
            },
        }
    }

    fn participant(status: ParticipantStatus, progress: u32, step: Option<ceremony_core::ContributionStep>) -> Participant {
        Participant {
            id: "alice".into(),
            status,
            contribution_progress: progress,
            contribution_step: step,
            contributions: vec![],
            temp_contribution_data: None,
        }
    }

    struct Fixture {
        ctx: DispatchContext,
        coordination: Arc<FakeCoordinationAdapter>,
        sink: Arc<RecordingStatusSink>,
        publisher: Arc<StubPublisher>,
    }

    fn build_fixture() -> Fixture {
        let coordination = Arc::new(FakeCoordinationAdapter::new());
        let storage = Arc::new(FakeStorageAdapter::new());
        let contributor = Arc::new(FakeZkeyContributor);
        let sink = Arc::new(RecordingStatusSink::new());

        let pipeline = Arc::new(ContributionPipeline::new(
            coordination.clone(),
            storage.clone(),
            contributor,
            sink.clone(),
            "-zkeys".into(),
            "https://verify.example/fn".into(),
        ));

        let publisher = Arc::new(StubPublisher::new());
        let finalizer = Arc::new(Finalizer::new(publisher.clone()));

        storage.put("ceremony-zkeys", "circuits/circuit_a/contributions/circuit_a_00000.zkey", bytes::Bytes::from_static(b"genesis"));

        let ctx = DispatchContext {
            coordination: coordination.clone(),
            pipeline,
            finalizer,
            sink: sink.clone(),
            ceremony_id: "ceremony".into(),
            ceremony_prefix: "ceremony".into(),
            ceremony_name: "Example Ceremony".into(),
            contributor_id: "alice".into(),
            oauth_token: "oauth-token".into(),
            queue_observer: Mutex::new(None),
        };

        Fixture { ctx, coordination, sink, publisher }
    }

    // Scenario 1: one circuit, happy path from first contribution through
    // the final attestation.
    #[tokio::test(start_paused = true)]
    async fn scenario_one_happy_path_runs_to_attestation_and_terminates() {
        let fixture = build_fixture();
        let circuits = vec![one_circuit(Some("alice"))];

        let contributing = participant(
            ParticipantStatus::Contributing,
            1,
            Some(ceremony_core::ContributionStep::Downloading),
        );
        let outcome = dispatch_snapshot(&fixture.ctx, None, &contributing, &circuits).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert!(fixture.coordination.calls().contains(&"verifyContribution".to_string()));

        let mut contributed = contributing.clone();
        contributed.status = ParticipantStatus::Contributed;
        contributed.contribution_step = Some(ceremony_core::ContributionStep::Completed);
        contributed.contributions = vec![Contribution { zkey_index: 1, hash: "h".into(), time_ms: 10, valid: Some(true) }];

        let outcome = dispatch_snapshot(&fixture.ctx, Some(&contributing), &contributed, &circuits).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert!(fixture.coordination.calls().contains(&"progressToNextCircuitForContribution".to_string()));

        let mut done = contributed.clone();
        done.status = ParticipantStatus::Done;

        let outcome = dispatch_snapshot(&fixture.ctx, Some(&contributed), &done, &circuits).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Terminate);

        let captured = fixture.publisher.captured_text.lock().unwrap().clone().unwrap();
        assert!(captured.contains("circuit_a"));
        assert!(captured.contains("hash=h"));
    }

    // Scenario 4: a cool-down timeout fires while COMPUTING, then the
    // participant is EXHUMED once the cool-down elapses.
    #[tokio::test]
    async fn scenario_four_timeout_then_exhumed_resumes() {
        let fixture = build_fixture();
        let circuits = vec![one_circuit(None)];
        fixture.coordination.set_timeouts("alice", vec![TimeoutRecord { end_date_ms: chrono::Utc::now().timestamp_millis() + 60_000 }]);

        let timed_out = participant(ParticipantStatus::TimedOut, 1, Some(ceremony_core::ContributionStep::Computing));
        let outcome = dispatch_snapshot(&fixture.ctx, None, &timed_out, &circuits).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert!(fixture.sink.events().iter().any(|e| e.message.starts_with("timed out; resumes in")));

        let exhumed = participant(ParticipantStatus::Exhumed, 1, Some(ceremony_core::ContributionStep::Computing));
        let outcome = dispatch_snapshot(&fixture.ctx, Some(&timed_out), &exhumed, &circuits).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert!(fixture
            .coordination
            .calls()
            .contains(&"resumeContributionAfterTimeoutExpiration".to_string()));
    }

    // Rule 4's fix: redelivery of the same WAITING snapshot must not spawn a
    // second queue observer.
    #[tokio::test(start_paused = true)]
    async fn waiting_redelivery_spawns_only_one_observer() {
        let fixture = build_fixture();
        let circuits = vec![one_circuit(Some("bob"))];
        let waiting = participant(ParticipantStatus::Waiting, 1, None);

        dispatch_snapshot(&fixture.ctx, None, &waiting, &circuits).await.unwrap();
        let first_handle_id = {
            let guard = fixture.ctx.queue_observer.lock().unwrap();
            guard.as_ref().unwrap().1.id()
        };

        dispatch_snapshot(&fixture.ctx, Some(&waiting), &waiting, &circuits).await.unwrap();
        let second_handle_id = {
            let guard = fixture.ctx.queue_observer.lock().unwrap();
            guard.as_ref().unwrap().1.id()
        };

        assert_eq!(first_handle_id, second_handle_id, "redelivered WAITING must not spawn a new observer task");
    }
}
