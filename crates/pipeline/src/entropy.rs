//! Entropy generation for zKey contributions: 32 independently drawn
//! uniform integers in `[0, 2^256)`, concatenated to a decimal string.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

const DRAWS: usize = 32;
const DRAW_BYTES: usize = 32;

/// Big-endian byte buffer to decimal string, via repeated divide-by-10.
fn be_bytes_to_decimal(bytes: &[u8]) -> String {
    let mut digits = bytes.to_vec();
    let mut out = Vec::new();

    while digits.iter().any(|&b| b != 0) {
        let mut remainder: u32 = 0;
        for d in digits.iter_mut() {
            let acc = (remainder << 8) | *d as u32;
            *d = (acc / 10) as u8;
            remainder = acc % 10;
        }
        out.push(std::char::from_digit(remainder, 10).expect("remainder < 10"));
    }
    if out.is_empty() {
        out.push('0');
    }
    out.reverse();
    out.into_iter().collect()
}

/// Draw `DRAWS` uniform 256-bit integers from a CSPRNG and concatenate
/// their decimal representations.
pub fn generate_entropy() -> String {
    let mut rng = ChaCha20Rng::from_entropy();
    let mut entropy = String::new();
    for _ in 0..DRAWS {
        let mut bytes = [0u8; DRAW_BYTES];
        rng.fill_bytes(&mut bytes);
        entropy.push_str(&be_bytes_to_decimal(&bytes));
    }
    entropy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_conversion_matches_known_values() {
        assert_eq!(be_bytes_to_decimal(&[0u8; 32]), "0");
        assert_eq!(be_bytes_to_decimal(&[0, 0, 1]), "1");
        assert_eq!(be_bytes_to_decimal(&[1, 0]), "256");
    }

    #[test]
    fn generate_entropy_produces_ascii_digits_only() {
        let entropy = generate_entropy();
        assert!(!entropy.is_empty());
        assert!(entropy.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn successive_draws_differ() {
        let a = generate_entropy();
        let b = generate_entropy();
        assert_ne!(a, b, "entropy must not repeat across draws");
    }
}
