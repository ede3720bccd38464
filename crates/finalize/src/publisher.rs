//! Attestation publisher: the identity-provider's paste/gist endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::FinalizeError;

/// A successfully published attestation blob.
#[derive(Debug, Clone)]
pub struct PublishedBlob {
    pub id: String,
    pub html_url: String,
}

#[async_trait]
pub trait AttestationPublisher: Send + Sync {
    async fn publish(&self, text: &str, token: &str) -> Result<PublishedBlob, FinalizeError>;
}

/// Publishes to a GitHub-Gist-shaped paste endpoint: `POST {base_url}`
/// with a bearer token, expecting `{id, html_url}` in the response.
pub struct GistAttestationPublisher {
    client: reqwest::Client,
    base_url: String,
    filename: String,
}

impl GistAttestationPublisher {
    pub fn new(base_url: String) -> Self {
        Self { client: reqwest::Client::new(), base_url, filename: "attestation.txt".to_string() }
    }
}

#[derive(Deserialize)]
struct GistResponse {
    id: String,
    html_url: String,
}

#[async_trait]
impl AttestationPublisher for GistAttestationPublisher {
    async fn publish(&self, text: &str, token: &str) -> Result<PublishedBlob, FinalizeError> {
        debug!(base_url = %self.base_url, "publishing attestation");

        let body = serde_json::json!({
            "description": "ceremony contribution attestation",
            "public": true,
            "files": {
                (self.filename.clone()): { "content": text }
            }
        });

        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FinalizeError::Publish(text));
        }

        let parsed: GistResponse = resp
            .json()
            .await
            .map_err(|e| FinalizeError::MalformedResponse(e.to_string()))?;

        Ok(PublishedBlob { id: parsed.id, html_url: parsed.html_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publisher_constructs_with_base_url() {
        let publisher = GistAttestationPublisher::new("https://paste.example/gists".into());
        assert_eq!(publisher.base_url, "https://paste.example/gists");
    }
}
