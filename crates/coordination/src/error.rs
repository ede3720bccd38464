use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("callable {0} failed: {1}")]
    Callable(String, String),

    #[error("document not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for CoordinationError {
    fn from(e: reqwest::Error) -> Self {
        CoordinationError::Transport(e.to_string())
    }
}
