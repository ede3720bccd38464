use thiserror::Error;

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("attestation publish failed: {0}")]
    Publish(String),

    #[error("attestation publish returned an unusable response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for FinalizeError {
    fn from(e: reqwest::Error) -> Self {
        FinalizeError::Publish(e.to_string())
    }
}
