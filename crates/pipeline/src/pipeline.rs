//! Contribution pipeline (C6): the DOWNLOAD → COMPUTE → UPLOAD → VERIFY
//! progression for one circuit, with resumption from any step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use ceremony_core::{naming, Circuit, ContributionStep, StatusSink, UploadedPart};
use ceremony_coordination::CoordinationAdapter;
use ceremony_storage::{PartRecorder, StorageAdapter, StorageError};
use tracing::{debug, warn};

use crate::contributor::ZkeyContributor;
use crate::entropy::generate_entropy;
use crate::error::PipelineError;
use crate::hash::format_hash;

/// Inter-step settle delay: the client sleeps on this order while the
/// server's document catches up to the callable it just ran. Tolerable
/// overhead, not a correctness gate (spec.md §4.4).
const SETTLE_DELAY: Duration = Duration::from_secs(2);

struct CoordinationPartRecorder {
    coordination: Arc<dyn CoordinationAdapter>,
    ceremony_id: String,
    participant_id: String,
}

#[async_trait]
impl PartRecorder for CoordinationPartRecorder {
    async fn record(&self, part: UploadedPart) -> Result<(), StorageError> {
        self.coordination
            .record_uploaded_part(&self.ceremony_id, &self.participant_id, part)
            .await
            .map_err(|e| StorageError::Checkpoint(e.to_string()))
    }
}

pub struct ContributionPipeline {
    coordination: Arc<dyn CoordinationAdapter>,
    storage: Arc<dyn StorageAdapter>,
    contributor: Arc<dyn ZkeyContributor>,
    sink: Arc<dyn StatusSink>,
    bucket_postfix: String,
    verify_contribution_url: String,
}

impl ContributionPipeline {
    pub fn new(
        coordination: Arc<dyn CoordinationAdapter>,
        storage: Arc<dyn StorageAdapter>,
        contributor: Arc<dyn ZkeyContributor>,
        sink: Arc<dyn StatusSink>,
        bucket_postfix: String,
        verify_contribution_url: String,
    ) -> Self {
        Self { coordination, storage, contributor, sink, bucket_postfix, verify_contribution_url }
    }

    fn bucket(&self, ceremony_prefix: &str) -> String {
        naming::bucket_name(ceremony_prefix, &self.bucket_postfix)
    }

    /// Execute the contribution for one circuit, beginning at whatever step
    /// the participant is currently in. Returns once the participant has
    /// reached VERIFYING (the server, not this pipeline, advances past it)
    /// or COMPLETED.
    pub async fn run_or_resume(
        &self,
        ceremony_id: &str,
        ceremony_prefix: &str,
        circuit: &Circuit,
        mut step: Option<ContributionStep>,
        mut temp_contribution_data: Option<Vec<UploadedPart>>,
        contributor_id: &str,
    ) -> Result<(), PipelineError> {
        let bucket = self.bucket(ceremony_prefix);
        let last_name = naming::last_zkey_name(&circuit.prefix, circuit.waiting_queue.completed_contributions);
        let next_name = naming::next_zkey_name(&circuit.prefix, circuit.waiting_queue.completed_contributions);
        let last_path = naming::storage_path(&circuit.prefix, &last_name);
        let next_path = naming::storage_path(&circuit.prefix, &next_name);

        let mut previous_zkey: Option<Bytes> = None;
        let mut next_zkey: Option<Vec<u8>> = None;

        loop {
            match step {
                None => {
                    return Err(PipelineError::InvariantViolation(
                        "run_or_resume invoked with no contribution step".into(),
                    ));
                }
                Some(ContributionStep::Downloading) => {
                    self.sink.busy(&format!("downloading {last_path}"));
                    let bytes = self.storage.download_artifact(&bucket, &last_path, self.sink.as_ref()).await?;
                    previous_zkey = Some(bytes);

                    self.coordination.progress_to_next_contribution_step(ceremony_id).await?;
                    tokio::time::sleep(SETTLE_DELAY).await;
                    step = Some(ContributionStep::Computing);
                }
                Some(ContributionStep::Computing) => {
                    let buffer = match previous_zkey.take() {
                        Some(b) => b,
                        None => {
                            // Resuming directly at COMPUTING (process
                            // restarted before DOWNLOAD was recorded as
                            // complete server-side would show DOWNLOADING
                            // again; reaching here with no buffer means we
                            // crashed after the download advanced the step
                            // but before committing a result locally —
                            // re-fetch rather than fail the contribution.
                            warn!("no in-memory previous zkey at COMPUTING, re-downloading");
                            self.storage.download_artifact(&bucket, &last_path, self.sink.as_ref()).await?
                        }
                    };

                    self.sink.busy("computing contribution");
                    let entropy = generate_entropy();
                    let start = Instant::now();
                    let output = self.contributor.contribute(&buffer, contributor_id, &entropy)?;
                    let time_ms = start.elapsed().as_millis() as u64;
                    let hash = format_hash(&output, "Contribution Hash: ");

                    self.coordination
                        .permanently_store_current_contribution_time_and_hash(ceremony_id, time_ms, &hash)
                        .await?;
                    self.sink.info(&hash);

                    next_zkey = Some(output);
                    self.coordination.progress_to_next_contribution_step(ceremony_id).await?;
                    tokio::time::sleep(SETTLE_DELAY).await;
                    step = Some(ContributionStep::Uploading);
                }
                Some(ContributionStep::Uploading) => {
                    let (buffer, recomputed) = match next_zkey.take() {
                        Some(b) => (b, false),
                        None => {
                            // Crash between COMPUTING and UPLOADING: the
                            // server already has the hash/time for this
                            // contribution but the in-memory output buffer
                            // did not survive the restart. Regenerate it
                            // locally (fresh download + fresh entropy) —
                            // no server callables are re-issued, since the
                            // server has already progressed past both
                            // steps.
                            warn!("no in-memory next zkey at UPLOADING, recomputing locally");
                            let prev = self.storage.download_artifact(&bucket, &last_path, self.sink.as_ref()).await?;
                            let entropy = generate_entropy();
                            (self.contributor.contribute(&prev, contributor_id, &entropy)?, true)
                        }
                    };

                    // A recomputed buffer is a distinct byte stream from
                    // whatever parts the prior attempt already uploaded —
                    // splicing old-attempt parts onto it would produce a
                    // corrupt object. Discard the checkpoint and re-upload
                    // every part from the fresh buffer instead.
                    let already_uploaded = if recomputed {
                        Vec::new()
                    } else {
                        temp_contribution_data.take().unwrap_or_default()
                    };
                    let recorder = CoordinationPartRecorder {
                        coordination: self.coordination.clone(),
                        ceremony_id: ceremony_id.to_string(),
                        participant_id: contributor_id.to_string(),
                    };

                    self.storage
                        .multipart_upload(&bucket, &next_path, Bytes::from(buffer), self.sink.as_ref(), &already_uploaded, &recorder)
                        .await?;

                    self.coordination.progress_to_next_contribution_step(ceremony_id).await?;
                    tokio::time::sleep(SETTLE_DELAY).await;
                    step = Some(ContributionStep::Verifying);
                }
                Some(ContributionStep::Verifying) => {
                    self.sink.busy("verifying contribution");
                    self.coordination
                        .verify_contribution(ceremony_id, &circuit.id, &bucket, contributor_id, &self.verify_contribution_url)
                        .await?;
                    debug!("verify submitted, awaiting server-driven advance");
                    return Ok(());
                }
                Some(ContributionStep::Completed) => {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceremony_core::{AvgTimings, RecordingStatusSink, WaitingQueue};
    use ceremony_coordination::FakeCoordinationAdapter;
    use ceremony_storage::FakeStorageAdapter;

    use crate::contributor::FakeZkeyContributor;

    fn sample_circuit() -> Circuit {
        Circuit {
            id: "c1".into(),
            sequence_position: 1,
            prefix: "circuit_a".into(),
            avg_timings: AvgTimings::default(),
            waiting_queue: WaitingQueue::default(),
        }
    }

    fn build_pipeline() -> (ContributionPipeline, Arc<FakeCoordinationAdapter>, Arc<FakeStorageAdapter>, Arc<RecordingStatusSink>) {
        let coordination = Arc::new(FakeCoordinationAdapter::new());
        let storage = Arc::new(FakeStorageAdapter::new());
        let contributor = Arc::new(FakeZkeyContributor);
        let sink = Arc::new(RecordingStatusSink::new());

        let pipeline = ContributionPipeline::new(
            coordination.clone(),
            storage.clone(),
            contributor,
            sink.clone(),
            "-zkeys".into(),
            "https://verify.example/fn".into(),
        );
        (pipeline, coordination, storage, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_runs_all_four_steps_to_verifying() {
        let (pipeline, coordination, storage, _sink) = build_pipeline();
        let circuit = sample_circuit();
        storage.put("ceremony-zkeys", "circuits/circuit_a/contributions/circuit_a_00000.zkey", Bytes::from_static(b"genesis"));

        pipeline
            .run_or_resume(
                "ceremony",
                "ceremony",
                &circuit,
                Some(ContributionStep::Downloading),
                None,
                "alice",
            )
            .await
            .unwrap();

        let calls = coordination.calls();
        assert_eq!(
            calls,
            vec![
                "progressToNextContributionStep".to_string(),
                "permanentlyStoreCurrentContributionTimeAndHash".to_string(),
                "progressToNextContributionStep".to_string(),
                "progressToNextContributionStep".to_string(),
                "verifyContribution".to_string(),
            ]
        );
        assert!(storage
            .get("ceremony-zkeys", "circuits/circuit_a/contributions/circuit_a_00001.zkey")
            .is_some());
    }

    #[tokio::test]
    async fn completed_step_is_a_no_op() {
        let (pipeline, coordination, _storage, _sink) = build_pipeline();
        let circuit = sample_circuit();

        pipeline
            .run_or_resume("ceremony", "ceremony", &circuit, Some(ContributionStep::Completed), None, "alice")
            .await
            .unwrap();

        assert!(coordination.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resuming_at_uploading_with_checkpoint_skips_acknowledged_parts() {
        let (pipeline, coordination, storage, _sink) = build_pipeline();
        let circuit = sample_circuit();
        storage.put("ceremony-zkeys", "circuits/circuit_a/contributions/circuit_a_00000.zkey", Bytes::from_static(b"genesis"));

        pipeline
            .run_or_resume(
                "ceremony",
                "ceremony",
                &circuit,
                Some(ContributionStep::Uploading),
                Some(vec![]),
                "alice",
            )
            .await
            .unwrap();

        assert!(coordination.calls().contains(&"verifyContribution".to_string()));
    }

    #[tokio::test]
    async fn missing_step_is_an_invariant_violation() {
        let (pipeline, _coordination, _storage, _sink) = build_pipeline();
        let circuit = sample_circuit();

        let err = pipeline.run_or_resume("ceremony", "ceremony", &circuit, None, None, "alice").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvariantViolation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn resuming_at_uploading_with_no_in_memory_buffer_discards_stale_checkpoint() {
        let (pipeline, coordination, storage, _sink) = build_pipeline();
        let circuit = sample_circuit();
        storage.put("ceremony-zkeys", "circuits/circuit_a/contributions/circuit_a_00000.zkey", Bytes::from_static(b"genesis"));

        // A process restart with no in-memory next-zkey buffer always
        // recomputes with fresh entropy. A checkpoint from the prior
        // attempt claiming part 1 is already uploaded must not be honored
        // against this new byte stream — every part has to go up again.
        pipeline
            .run_or_resume(
                "ceremony",
                "ceremony",
                &circuit,
                Some(ContributionStep::Uploading),
                Some(vec![UploadedPart { number: 1, etag: "stale-etag-from-prior-attempt".into() }]),
                "alice",
            )
            .await
            .unwrap();

        let recorded_parts = coordination.calls().iter().filter(|c| *c == "recordUploadedPart").count();
        assert_eq!(recorded_parts, 1, "the recomputed buffer's part must be uploaded and recorded, not skipped");
    }
}
