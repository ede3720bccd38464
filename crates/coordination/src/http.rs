//! HTTP-backed coordination adapter. Document reads/subscriptions and
//! callables are all plain JSON over HTTP against the terms-table paths
//! from `ceremony_core::config::CoordinationConfig`.

use std::time::Duration;

use async_trait::async_trait;
use ceremony_core::config::CoordinationConfig;
use ceremony_core::{Ceremony, Circuit, Contribution, Participant, TimeoutRecord, UploadedPart};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::adapter::{CoordinationAdapter, DocumentSnapshot, Subscription};
use crate::error::CoordinationError;

/// Poll interval for the subscription background tasks. The server's
/// commit-order guarantee is per-ref; polling on a short fixed interval is
/// an adequate stand-in for a push-based change-notification transport
/// (out of scope per spec.md §1) as long as delivery stays at-least-once.
const SUBSCRIBE_POLL_INTERVAL: Duration = Duration::from_secs(3);

pub struct HttpCoordinationAdapter {
    client: reqwest::Client,
    config: CoordinationConfig,
}

impl HttpCoordinationAdapter {
    pub fn new(config: CoordinationConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    async fn get_doc<T: DeserializeOwned>(&self, path: &str) -> Result<DocumentSnapshot<T>, CoordinationError> {
        let url = format!("{}/{}", self.config.base_url, path);
        debug!(url = %url, "coordination: get_doc");
        let resp = self.client.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(DocumentSnapshot::missing());
        }
        if !resp.status().is_success() {
            return Err(CoordinationError::Transport(format!(
                "GET {} returned {}",
                url,
                resp.status()
            )));
        }

        let data = resp
            .json::<T>()
            .await
            .map_err(|e| CoordinationError::Deserialize(e.to_string()))?;
        Ok(DocumentSnapshot::found(data))
    }

    async fn call(&self, name: &str, path: &str, body: serde_json::Value) -> Result<(), CoordinationError> {
        let url = format!("{}/{}", self.config.base_url, path);
        debug!(url = %url, callable = name, "coordination: call");
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoordinationError::Callable(name.to_string(), e.to_string()))?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CoordinationError::Callable(name.to_string(), text));
        }
        Ok(())
    }

    /// Spawn a polling loop that pushes snapshots of `path` onto a channel
    /// until the receiver is dropped.
    fn spawn_poll_loop<T>(&self, path: String) -> Subscription<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(8);
        let client = self.client.clone();
        let base_url = self.config.base_url.clone();

        let handle = tokio::spawn(async move {
            loop {
                let url = format!("{}/{}", base_url, path);
                let snapshot = match client.get(&url).send().await {
                    Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                        Some(DocumentSnapshot::missing())
                    }
                    Ok(resp) if resp.status().is_success() => match resp.json::<T>().await {
                        Ok(data) => Some(DocumentSnapshot::found(data)),
                        Err(e) => {
                            warn!(path = %path, error = %e, "subscription: failed to decode snapshot");
                            None
                        }
                    },
                    Ok(resp) => {
                        warn!(path = %path, status = %resp.status(), "subscription: unexpected status");
                        None
                    }
                    Err(e) => {
                        warn!(path = %path, error = %e, "subscription: transport error, retrying");
                        None
                    }
                };

                if let Some(snapshot) = snapshot {
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }

                tokio::time::sleep(SUBSCRIBE_POLL_INTERVAL).await;
            }
        });

        Subscription::new(rx, handle)
    }
}

#[async_trait]
impl CoordinationAdapter for HttpCoordinationAdapter {
    async fn get_ceremony(&self, ceremony_id: &str) -> Result<DocumentSnapshot<Ceremony>, CoordinationError> {
        self.get_doc(&format!("{}/{}", self.config.ceremonies_term, ceremony_id)).await
    }

    async fn get_participant(
        &self,
        ceremony_id: &str,
        participant_id: &str,
    ) -> Result<DocumentSnapshot<Participant>, CoordinationError> {
        self.get_doc(&format!(
            "{}/{}/{}/{}",
            self.config.ceremonies_term, ceremony_id, self.config.participants_term, participant_id
        ))
        .await
    }

    async fn get_circuit(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
    ) -> Result<DocumentSnapshot<Circuit>, CoordinationError> {
        self.get_doc(&format!(
            "{}/{}/{}/{}",
            self.config.ceremonies_term, ceremony_id, self.config.circuits_term, circuit_id
        ))
        .await
    }

    async fn get_active_timeouts(
        &self,
        ceremony_id: &str,
        participant_id: &str,
    ) -> Result<Vec<TimeoutRecord>, CoordinationError> {
        let path = format!(
            "{}/{}/{}/{}/{}",
            self.config.ceremonies_term,
            ceremony_id,
            self.config.participants_term,
            participant_id,
            self.config.timeouts_term
        );
        let snapshot: DocumentSnapshot<Vec<TimeoutRecord>> = self.get_doc(&path).await?;
        Ok(snapshot.data.unwrap_or_default())
    }

    async fn get_contributions(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
    ) -> Result<Vec<Contribution>, CoordinationError> {
        let path = format!(
            "{}/{}/{}/{}/{}",
            self.config.ceremonies_term, ceremony_id, self.config.circuits_term, circuit_id, self.config.contributions_term
        );
        let snapshot: DocumentSnapshot<Vec<Contribution>> = self.get_doc(&path).await?;
        Ok(snapshot.data.unwrap_or_default())
    }

    fn subscribe_participant(&self, ceremony_id: &str, participant_id: &str) -> Subscription<Participant> {
        let path = format!(
            "{}/{}/{}/{}",
            self.config.ceremonies_term, ceremony_id, self.config.participants_term, participant_id
        );
        self.spawn_poll_loop(path)
    }

    fn subscribe_circuit(&self, ceremony_id: &str, circuit_id: &str) -> Subscription<Circuit> {
        let path = format!(
            "{}/{}/{}/{}",
            self.config.ceremonies_term, ceremony_id, self.config.circuits_term, circuit_id
        );
        self.spawn_poll_loop(path)
    }

    async fn check_participant_for_ceremony(&self, ceremony_id: &str) -> Result<bool, CoordinationError> {
        let url = format!(
            "{}/{}/{}/checkParticipantForCeremony",
            self.config.base_url, self.config.ceremonies_term, ceremony_id
        );
        let resp = self.client.post(&url).send().await?;
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CoordinationError::Callable("checkParticipantForCeremony".into(), text));
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            valid: bool,
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| CoordinationError::Deserialize(e.to_string()))?;
        Ok(body.valid)
    }

    async fn progress_to_next_circuit_for_contribution(&self, ceremony_id: &str) -> Result<(), CoordinationError> {
        self.call(
            "progressToNextCircuitForContribution",
            &format!(
                "{}/{}/progressToNextCircuitForContribution",
                self.config.ceremonies_term, ceremony_id
            ),
            json!({}),
        )
        .await
    }

    async fn progress_to_next_contribution_step(&self, ceremony_id: &str) -> Result<(), CoordinationError> {
        self.call(
            "progressToNextContributionStep",
            &format!(
                "{}/{}/progressToNextContributionStep",
                self.config.ceremonies_term, ceremony_id
            ),
            json!({}),
        )
        .await
    }

    async fn permanently_store_current_contribution_time_and_hash(
        &self,
        ceremony_id: &str,
        time_ms: u64,
        hash: &str,
    ) -> Result<(), CoordinationError> {
        self.call(
            "permanentlyStoreCurrentContributionTimeAndHash",
            &format!(
                "{}/{}/permanentlyStoreCurrentContributionTimeAndHash",
                self.config.ceremonies_term, ceremony_id
            ),
            json!({ "timeMs": time_ms, "hash": hash }),
        )
        .await
    }

    async fn verify_contribution(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
        bucket: &str,
        contributor_id: &str,
        verify_url: &str,
    ) -> Result<(), CoordinationError> {
        self.call(
            "verifyContribution",
            &format!("{}/{}/verifyContribution", self.config.ceremonies_term, ceremony_id),
            json!({
                "circuitId": circuit_id,
                "bucket": bucket,
                "contributorId": contributor_id,
                "verifyUrl": verify_url,
            }),
        )
        .await
    }

    async fn resume_contribution_after_timeout_expiration(&self, ceremony_id: &str) -> Result<(), CoordinationError> {
        self.call(
            "resumeContributionAfterTimeoutExpiration",
            &format!(
                "{}/{}/resumeContributionAfterTimeoutExpiration",
                self.config.ceremonies_term, ceremony_id
            ),
            json!({}),
        )
        .await
    }

    async fn record_uploaded_part(
        &self,
        ceremony_id: &str,
        participant_id: &str,
        part: UploadedPart,
    ) -> Result<(), CoordinationError> {
        self.call(
            "recordUploadedPart",
            &format!(
                "{}/{}/{}/{}/recordUploadedPart",
                self.config.ceremonies_term, ceremony_id, self.config.participants_term, participant_id
            ),
            json!({ "number": part.number, "etag": part.etag }),
        )
        .await
    }
}
