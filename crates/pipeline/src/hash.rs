//! Contribution hash formatting.

use sha2::{Digest, Sha256};

/// `formatHash(output, prefix)`: `{prefix}{hex(sha256(output))}`.
pub fn format_hash(output: &[u8], prefix: &str) -> String {
    let digest = Sha256::digest(output);
    format!("{prefix}{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_and_hex_encodes() {
        let hash = format_hash(b"hello world", "Contribution Hash: ");
        assert!(hash.starts_with("Contribution Hash: "));
        let hex_part = hash.strip_prefix("Contribution Hash: ").unwrap();
        assert_eq!(hex_part.len(), 64);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(format_hash(b"abc", "p: "), format_hash(b"abc", "p: "));
    }
}
