pub mod attestation;
pub mod error;
pub mod publisher;

pub use attestation::Finalizer;
pub use error::FinalizeError;
pub use publisher::{AttestationPublisher, GistAttestationPublisher, PublishedBlob};
