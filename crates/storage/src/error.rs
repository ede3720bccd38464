use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("checkpoint callable failed: {0}")]
    Checkpoint(String),
}
