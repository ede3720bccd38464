use thiserror::Error;

use ceremony_coordination::CoordinationError;
use ceremony_finalize::FinalizeError;
use ceremony_pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Finalize(#[from] FinalizeError),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
