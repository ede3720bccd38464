//! Circuit queue observer (C7): watches the circuit document while the
//! participant is WAITING, reports position and ETA, and hands control
//! back once the participant reaches the front of the queue.

use std::sync::Arc;

use ceremony_core::{timefmt::format_duration_ms, Circuit, StatusSink};
use ceremony_coordination::CoordinationAdapter;

/// Pure position/ETA bookkeeping, decoupled from the subscription
/// transport so it can be unit-tested against plain `Circuit` values.
pub struct QueueObserver {
    last_reported_position: Option<usize>,
}

impl Default for QueueObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueObserver {
    pub fn new() -> Self {
        Self { last_reported_position: None }
    }

    /// Process one circuit snapshot. Returns `true` if the participant has
    /// reached the front of the queue (caller should unsubscribe).
    pub fn handle_snapshot(&mut self, participant_id: &str, circuit: &Circuit, sink: &dyn StatusSink) -> bool {
        let pos = match circuit.waiting_queue.position_of(participant_id) {
            Some(p) => p,
            None => return false,
        };

        if pos == 1 {
            sink.info("first in queue");
            return true;
        }

        if self.last_reported_position != Some(pos) {
            let eta_ms = if circuit.avg_timings.is_known() {
                circuit.avg_timings.per_contributor_ms() * (pos as u64 - 1)
            } else {
                0
            };
            sink.info(&format!("position {pos}, ETA {}", format_duration_ms(eta_ms as i64)));
            self.last_reported_position = Some(pos);
        }

        false
    }
}

/// Subscribe to the circuit document and drive `QueueObserver` until the
/// participant reaches position 1, then unsubscribe.
pub async fn observe_until_first_in_queue(
    coordination: Arc<dyn CoordinationAdapter>,
    ceremony_id: &str,
    circuit_id: &str,
    participant_id: &str,
    sink: &dyn StatusSink,
) {
    let mut subscription = coordination.subscribe_circuit(ceremony_id, circuit_id);
    let mut observer = QueueObserver::new();

    while let Some(snapshot) = subscription.snapshots.recv().await {
        let Some(circuit) = snapshot.data else { continue };
        if observer.handle_snapshot(participant_id, &circuit, sink) {
            subscription.unsubscribe();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceremony_core::{AvgTimings, RecordingStatusSink, WaitingQueue};

    fn circuit_with_contributors(contributors: Vec<&str>) -> Circuit {
        Circuit {
            id: "c1".into(),
            sequence_position: 1,
            prefix: "circuit_a".into(),
            avg_timings: AvgTimings { full_contribution_ms: 10_000, verify_cloud_function_ms: 2_000 },
            waiting_queue: WaitingQueue {
                current_contributor: None,
                contributors: contributors.into_iter().map(String::from).collect(),
                completed_contributions: 0,
            },
        }
    }

    #[test]
    fn reports_position_and_eta_then_first_in_queue() {
        let sink = RecordingStatusSink::new();
        let mut observer = QueueObserver::new();

        let done = observer.handle_snapshot("self", &circuit_with_contributors(vec!["p1", "p2", "self"]), &sink);
        assert!(!done);
        let last = sink.last().unwrap();
        assert!(last.message.contains("position 3"));
        assert!(last.message.contains("00:00:00:24"));

        let done = observer.handle_snapshot("self", &circuit_with_contributors(vec!["p2", "self"]), &sink);
        assert!(!done);
        assert!(sink.last().unwrap().message.contains("position 2"));
        assert!(sink.last().unwrap().message.contains("00:00:00:12"));

        let done = observer.handle_snapshot("self", &circuit_with_contributors(vec!["self"]), &sink);
        assert!(done);
        assert_eq!(sink.last().unwrap().message, "first in queue");
    }

    #[test]
    fn unchanged_position_does_not_re_emit() {
        let sink = RecordingStatusSink::new();
        let mut observer = QueueObserver::new();

        observer.handle_snapshot("self", &circuit_with_contributors(vec!["p1", "self"]), &sink);
        let count_before = sink.events().len();
        observer.handle_snapshot("self", &circuit_with_contributors(vec!["p1", "self"]), &sink);
        assert_eq!(sink.events().len(), count_before, "unchanged position must not re-emit");
    }

    #[test]
    fn unknown_timings_yield_zero_eta() {
        let sink = RecordingStatusSink::new();
        let mut observer = QueueObserver::new();
        let mut circuit = circuit_with_contributors(vec!["p1", "self"]);
        circuit.avg_timings = AvgTimings::default();

        observer.handle_snapshot("self", &circuit, &sink);
        assert!(sink.last().unwrap().message.contains("00:00:00:00"));
    }
}
