//! Finalizer (C9): builds the public attestation, publishes it, and
//! derives a shareable reference.

use std::sync::Arc;

use ceremony_core::{Circuit, Contribution};

use crate::error::FinalizeError;
use crate::publisher::AttestationPublisher;

pub struct Finalizer {
    publisher: Arc<dyn AttestationPublisher>,
}

impl Finalizer {
    pub fn new(publisher: Arc<dyn AttestationPublisher>) -> Self {
        Self { publisher }
    }

    /// `handlePublicAttestation`: enumerate each circuit's hash and zKey
    /// index, publish the resulting text, return the share reference.
    pub async fn handle_public_attestation(
        &self,
        ceremony_name: &str,
        participant_id: &str,
        circuits: &[Circuit],
        contributions: &[Contribution],
        token: &str,
    ) -> Result<String, FinalizeError> {
        let text = build_attestation_text(ceremony_name, participant_id, circuits, contributions);
        let blob = self.publisher.publish(&text, token).await?;
        Ok(blob.html_url)
    }
}

fn build_attestation_text(ceremony_name: &str, participant_id: &str, circuits: &[Circuit], contributions: &[Contribution]) -> String {
    let mut text = format!("Attestation of contribution to \"{ceremony_name}\"\nParticipant: {participant_id}\n\n");
    for (circuit, contribution) in circuits.iter().zip(contributions.iter()) {
        text.push_str(&format!(
            "circuit={} zkeyIndex={} hash={}\n",
            circuit.prefix, contribution.zkey_index, contribution.hash
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ceremony_core::AvgTimings;
    use ceremony_core::WaitingQueue;

    use crate::publisher::PublishedBlob;

    struct StubPublisher {
        captured_text: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl AttestationPublisher for StubPublisher {
        async fn publish(&self, text: &str, _token: &str) -> Result<PublishedBlob, FinalizeError> {
            *self.captured_text.lock().unwrap() = Some(text.to_string());
            Ok(PublishedBlob { id: "abc123".into(), html_url: "https://paste.example/abc123".into() })
        }
    }

    fn circuit(prefix: &str) -> Circuit {
        Circuit {
            id: prefix.into(),
            sequence_position: 1,
            prefix: prefix.into(),
            avg_timings: AvgTimings::default(),
            waiting_queue: WaitingQueue::default(),
        }
    }

    #[tokio::test]
    async fn builds_text_enumerating_every_circuit_and_returns_share_url() {
        let publisher = Arc::new(StubPublisher { captured_text: std::sync::Mutex::new(None) });
        let finalizer = Finalizer::new(publisher.clone());

        let circuits = vec![circuit("circuit_a"), circuit("circuit_b")];
        let contributions = vec![
            Contribution { zkey_index: 1, hash: "hash-a".into(), time_ms: 100, valid: Some(true) },
            Contribution { zkey_index: 1, hash: "hash-b".into(), time_ms: 200, valid: Some(true) },
        ];

        let share_ref = finalizer
            .handle_public_attestation("Example Ceremony", "alice", &circuits, &contributions, "oauth-token")
            .await
            .unwrap();

        assert_eq!(share_ref, "https://paste.example/abc123");
        let captured = publisher.captured_text.lock().unwrap().clone().unwrap();
        assert!(captured.contains("circuit_a"));
        assert!(captured.contains("hash-a"));
        assert!(captured.contains("circuit_b"));
        assert!(captured.contains("hash-b"));
    }
}
