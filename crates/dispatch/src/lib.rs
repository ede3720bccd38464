pub mod dispatch;
pub mod error;
pub mod predicates;

pub use dispatch::{dispatch_snapshot, DispatchContext, DispatchOutcome};
pub use error::DispatchError;
pub use predicates::Predicates;
