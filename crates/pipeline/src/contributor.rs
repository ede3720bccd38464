//! The SNARK zKey contribution primitive — treated as an external,
//! deterministic-with-randomness transform (spec.md §1 Non-goals: no
//! cryptographic verification logic lives in this core).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContributeError {
    #[error("contribution computation failed: {0}")]
    Failed(String),
}

/// Wraps the zKey contribution computation. A real implementation binds to
/// a native SNARK library; this trait exists so the pipeline never depends
/// on which one.
pub trait ZkeyContributor: Send + Sync {
    fn contribute(&self, previous_zkey: &[u8], contributor_id: &str, entropy: &str) -> Result<Vec<u8>, ContributeError>;
}

/// Deterministic stand-in contributor for tests: appends a fixed-length
/// digest of `(contributor_id, entropy)` to the previous zkey bytes. Not a
/// real cryptographic transform.
#[derive(Debug, Default)]
pub struct FakeZkeyContributor;

impl ZkeyContributor for FakeZkeyContributor {
    fn contribute(&self, previous_zkey: &[u8], contributor_id: &str, entropy: &str) -> Result<Vec<u8>, ContributeError> {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(previous_zkey);
        hasher.update(contributor_id.as_bytes());
        hasher.update(entropy.as_bytes());
        let tag = hasher.finalize();

        let mut output = previous_zkey.to_vec();
        output.extend_from_slice(&tag);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_contributor_is_deterministic_for_same_inputs() {
        let c = FakeZkeyContributor;
        let a = c.contribute(b"prev", "alice", "123").unwrap();
        let b = c.contribute(b"prev", "alice", "123").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fake_contributor_varies_with_entropy() {
        let c = FakeZkeyContributor;
        let a = c.contribute(b"prev", "alice", "123").unwrap();
        let b = c.contribute(b"prev", "alice", "456").unwrap();
        assert_ne!(a, b);
    }
}
