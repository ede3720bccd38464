//! Coordination adapter (C4): document reads, change subscriptions, and the
//! idempotent server callables.

use async_trait::async_trait;
use ceremony_core::{Ceremony, Circuit, Contribution, Participant, TimeoutRecord, UploadedPart};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::CoordinationError;

/// A document read. Firestore-style stores can return "not found" as an
/// empty snapshot rather than an error; callers interpret `exists == false`
/// as a soft error per spec.md §4.2.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot<T> {
    pub exists: bool,
    pub data: Option<T>,
}

impl<T> DocumentSnapshot<T> {
    pub fn found(data: T) -> Self {
        Self { exists: true, data: Some(data) }
    }

    pub fn missing() -> Self {
        Self { exists: false, data: None }
    }
}

/// A live subscription to a single document ref. Snapshots are delivered
/// in commit order per ref; delivery is at-least-once, so every snapshot
/// the dispatcher processes must be treated as possibly redelivered.
pub struct Subscription<T> {
    pub snapshots: mpsc::Receiver<DocumentSnapshot<T>>,
    handle: JoinHandle<()>,
}

impl<T> Subscription<T> {
    pub fn new(snapshots: mpsc::Receiver<DocumentSnapshot<T>>, handle: JoinHandle<()>) -> Self {
        Self { snapshots, handle }
    }

    /// Release the subscription. Idempotent — dropping a `Subscription`
    /// also aborts its background task.
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Everything the core consumes from the coordination store: document
/// reads/subscriptions and the idempotent server callables listed in
/// spec.md §4.2/§6. Implementations (HTTP-backed, in-memory fake) must
/// treat every callable as idempotent — redeliveries of the same logical
/// state must be a no-op server-side.
#[async_trait]
pub trait CoordinationAdapter: Send + Sync {
    async fn get_ceremony(&self, ceremony_id: &str) -> Result<DocumentSnapshot<Ceremony>, CoordinationError>;

    async fn get_participant(
        &self,
        ceremony_id: &str,
        participant_id: &str,
    ) -> Result<DocumentSnapshot<Participant>, CoordinationError>;

    async fn get_circuit(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
    ) -> Result<DocumentSnapshot<Circuit>, CoordinationError>;

    async fn get_active_timeouts(
        &self,
        ceremony_id: &str,
        participant_id: &str,
    ) -> Result<Vec<TimeoutRecord>, CoordinationError>;

    async fn get_contributions(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
    ) -> Result<Vec<Contribution>, CoordinationError>;

    /// Subscribe to the participant document. Ordering is per-ref only —
    /// callers must not assume any ordering relative to circuit
    /// subscriptions.
    fn subscribe_participant(&self, ceremony_id: &str, participant_id: &str) -> Subscription<Participant>;

    /// Subscribe to a circuit document.
    fn subscribe_circuit(&self, ceremony_id: &str, circuit_id: &str) -> Subscription<Circuit>;

    async fn check_participant_for_ceremony(&self, ceremony_id: &str) -> Result<bool, CoordinationError>;

    async fn progress_to_next_circuit_for_contribution(&self, ceremony_id: &str) -> Result<(), CoordinationError>;

    async fn progress_to_next_contribution_step(&self, ceremony_id: &str) -> Result<(), CoordinationError>;

    async fn permanently_store_current_contribution_time_and_hash(
        &self,
        ceremony_id: &str,
        time_ms: u64,
        hash: &str,
    ) -> Result<(), CoordinationError>;

    async fn verify_contribution(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
        bucket: &str,
        contributor_id: &str,
        verify_url: &str,
    ) -> Result<(), CoordinationError>;

    async fn resume_contribution_after_timeout_expiration(&self, ceremony_id: &str) -> Result<(), CoordinationError>;

    /// Record one successfully-uploaded part's ETag+number into the
    /// participant's `tempContributionData` (spec.md §4.3). Not one of the
    /// six named progression callables, but equally idempotent — a
    /// redelivered record for an already-acknowledged part number is a
    /// no-op server-side.
    async fn record_uploaded_part(
        &self,
        ceremony_id: &str,
        participant_id: &str,
        part: UploadedPart,
    ) -> Result<(), CoordinationError>;
}
