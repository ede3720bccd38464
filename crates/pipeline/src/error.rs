use thiserror::Error;

use ceremony_coordination::CoordinationError;
use ceremony_storage::StorageError;

use crate::contributor::ContributeError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Contribute(#[from] ContributeError),

    #[error("contribution step invariant violated: {0}")]
    InvariantViolation(String),
}
