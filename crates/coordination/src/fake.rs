//! In-memory coordination adapter used by the test suites of the
//! dependent crates (dispatch, pipeline, queue). Lets a test script push
//! participant/circuit snapshots and inspect which callables were
//! invoked, without standing up an HTTP server.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ceremony_core::{Ceremony, Circuit, Contribution, Participant, TimeoutRecord, UploadedPart};
use tokio::sync::{broadcast, mpsc};

use crate::adapter::{CoordinationAdapter, DocumentSnapshot, Subscription};
use crate::error::CoordinationError;

#[derive(Default)]
pub struct FakeCoordinationAdapter {
    ceremony: Mutex<Option<Ceremony>>,
    participants: Mutex<HashMap<String, Participant>>,
    circuits: Mutex<HashMap<String, Circuit>>,
    timeouts: Mutex<HashMap<String, Vec<TimeoutRecord>>>,
    contributions: Mutex<HashMap<String, Vec<Contribution>>>,
    participant_bus: Mutex<HashMap<String, broadcast::Sender<DocumentSnapshot<Participant>>>>,
    circuit_bus: Mutex<HashMap<String, broadcast::Sender<DocumentSnapshot<Circuit>>>>,
    calls: Mutex<Vec<String>>,
    check_participant_result: Mutex<bool>,
}

impl FakeCoordinationAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ceremony(&self, ceremony: Ceremony) {
        *self.ceremony.lock().unwrap() = Some(ceremony);
    }

    pub fn set_check_participant_result(&self, value: bool) {
        *self.check_participant_result.lock().unwrap() = value;
    }

    pub fn set_timeouts(&self, participant_id: &str, timeouts: Vec<TimeoutRecord>) {
        self.timeouts.lock().unwrap().insert(participant_id.to_string(), timeouts);
    }

    pub fn set_contributions(&self, circuit_id: &str, contributions: Vec<Contribution>) {
        self.contributions.lock().unwrap().insert(circuit_id.to_string(), contributions);
    }

    /// Push a new participant snapshot: updates the stored doc and fans it
    /// out to every live subscriber.
    pub fn push_participant(&self, participant_id: &str, participant: Participant) {
        self.participants
            .lock()
            .unwrap()
            .insert(participant_id.to_string(), participant.clone());
        let bus = self.participant_bus.lock().unwrap();
        if let Some(tx) = bus.get(participant_id) {
            let _ = tx.send(DocumentSnapshot::found(participant));
        }
    }

    pub fn push_circuit(&self, circuit_id: &str, circuit: Circuit) {
        self.circuits.lock().unwrap().insert(circuit_id.to_string(), circuit.clone());
        let bus = self.circuit_bus.lock().unwrap();
        if let Some(tx) = bus.get(circuit_id) {
            let _ = tx.send(DocumentSnapshot::found(circuit));
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl CoordinationAdapter for FakeCoordinationAdapter {
    async fn get_ceremony(&self, _ceremony_id: &str) -> Result<DocumentSnapshot<Ceremony>, CoordinationError> {
        Ok(match self.ceremony.lock().unwrap().clone() {
            Some(c) => DocumentSnapshot::found(c),
            None => DocumentSnapshot::missing(),
        })
    }

    async fn get_participant(
        &self,
        _ceremony_id: &str,
        participant_id: &str,
    ) -> Result<DocumentSnapshot<Participant>, CoordinationError> {
        Ok(match self.participants.lock().unwrap().get(participant_id).cloned() {
            Some(p) => DocumentSnapshot::found(p),
            None => DocumentSnapshot::missing(),
        })
    }

    async fn get_circuit(
        &self,
        _ceremony_id: &str,
        circuit_id: &str,
    ) -> Result<DocumentSnapshot<Circuit>, CoordinationError> {
        Ok(match self.circuits.lock().unwrap().get(circuit_id).cloned() {
            Some(c) => DocumentSnapshot::found(c),
            None => DocumentSnapshot::missing(),
        })
    }

    async fn get_active_timeouts(
        &self,
        _ceremony_id: &str,
        participant_id: &str,
    ) -> Result<Vec<TimeoutRecord>, CoordinationError> {
        Ok(self.timeouts.lock().unwrap().get(participant_id).cloned().unwrap_or_default())
    }

    async fn get_contributions(
        &self,
        _ceremony_id: &str,
        circuit_id: &str,
    ) -> Result<Vec<Contribution>, CoordinationError> {
        Ok(self.contributions.lock().unwrap().get(circuit_id).cloned().unwrap_or_default())
    }

    fn subscribe_participant(&self, _ceremony_id: &str, participant_id: &str) -> Subscription<Participant> {
        let mut bus = self.participant_bus.lock().unwrap();
        let tx = bus
            .entry(participant_id.to_string())
            .or_insert_with(|| broadcast::channel(32).0)
            .clone();
        let mut broadcast_rx = tx.subscribe();
        let (fwd_tx, fwd_rx) = mpsc::channel(32);

        let handle = tokio::spawn(async move {
            while let Ok(snapshot) = broadcast_rx.recv().await {
                if fwd_tx.send(snapshot).await.is_err() {
                    break;
                }
            }
        });

        Subscription::new(fwd_rx, handle)
    }

    fn subscribe_circuit(&self, _ceremony_id: &str, circuit_id: &str) -> Subscription<Circuit> {
        let mut bus = self.circuit_bus.lock().unwrap();
        let tx = bus
            .entry(circuit_id.to_string())
            .or_insert_with(|| broadcast::channel(32).0)
            .clone();
        let mut broadcast_rx = tx.subscribe();
        let (fwd_tx, fwd_rx) = mpsc::channel(32);

        let handle = tokio::spawn(async move {
            while let Ok(snapshot) = broadcast_rx.recv().await {
                if fwd_tx.send(snapshot).await.is_err() {
                    break;
                }
            }
        });

        Subscription::new(fwd_rx, handle)
    }

    async fn check_participant_for_ceremony(&self, _ceremony_id: &str) -> Result<bool, CoordinationError> {
        self.log("checkParticipantForCeremony");
        Ok(*self.check_participant_result.lock().unwrap())
    }

    async fn progress_to_next_circuit_for_contribution(&self, _ceremony_id: &str) -> Result<(), CoordinationError> {
        self.log("progressToNextCircuitForContribution");
        Ok(())
    }

    async fn progress_to_next_contribution_step(&self, _ceremony_id: &str) -> Result<(), CoordinationError> {
        self.log("progressToNextContributionStep");
        Ok(())
    }

    async fn permanently_store_current_contribution_time_and_hash(
        &self,
        _ceremony_id: &str,
        _time_ms: u64,
        _hash: &str,
    ) -> Result<(), CoordinationError> {
        self.log("permanentlyStoreCurrentContributionTimeAndHash");
        Ok(())
    }

    async fn verify_contribution(
        &self,
        _ceremony_id: &str,
        _circuit_id: &str,
        _bucket: &str,
        _contributor_id: &str,
        _verify_url: &str,
    ) -> Result<(), CoordinationError> {
        self.log("verifyContribution");
        Ok(())
    }

    async fn resume_contribution_after_timeout_expiration(&self, _ceremony_id: &str) -> Result<(), CoordinationError> {
        self.log("resumeContributionAfterTimeoutExpiration");
        Ok(())
    }

    async fn record_uploaded_part(
        &self,
        _ceremony_id: &str,
        _participant_id: &str,
        _part: UploadedPart,
    ) -> Result<(), CoordinationError> {
        self.log("recordUploadedPart");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceremony_core::ParticipantStatus;

    fn sample_participant(status: ParticipantStatus) -> Participant {
        Participant {
            id: "p1".into(),
            status,
            contribution_progress: 0,
            contribution_step: None,
            contributions: vec![],
            temp_contribution_data: None,
        }
    }

    #[tokio::test]
    async fn push_participant_is_observed_by_subscriber() {
        let adapter = FakeCoordinationAdapter::new();
        let mut sub = adapter.subscribe_participant("cer", "p1");

        adapter.push_participant("p1", sample_participant(ParticipantStatus::Waiting));

        let snapshot = sub.snapshots.recv().await.expect("snapshot");
        assert!(snapshot.exists);
        assert_eq!(snapshot.data.unwrap().status, ParticipantStatus::Waiting);
    }

    #[tokio::test]
    async fn callables_are_logged() {
        let adapter = FakeCoordinationAdapter::new();
        adapter.progress_to_next_circuit_for_contribution("cer").await.unwrap();
        adapter.resume_contribution_after_timeout_expiration("cer").await.unwrap();
        assert_eq!(
            adapter.calls(),
            vec![
                "progressToNextCircuitForContribution".to_string(),
                "resumeContributionAfterTimeoutExpiration".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_participant_is_soft_error() {
        let adapter = FakeCoordinationAdapter::new();
        let snapshot = adapter.get_participant("cer", "ghost").await.unwrap();
        assert!(!snapshot.exists);
    }
}
