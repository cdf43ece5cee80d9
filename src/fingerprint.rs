//! Content fingerprints used as unit ids and cache keys.

use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Hex-encoded SHA-256 of `text`.
pub fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// Stable identifier of a unit: the first 16 hex digits of its content hash.
pub fn unit_id(content: &str) -> String {
    let mut hex = sha256_hex(content);
    hex.truncate(16);
    hex
}

/// Coarse fingerprint of the indexed corpus, derived from aggregate counts only.
pub fn corpus_state_hash(items: usize, chunks: usize) -> String {
    sha256_hex(&format!("items={items};chunks={chunks}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_unit_id_collapses_identical_content() {
        assert_eq!(unit_id("same words"), unit_id("same words"));
        assert_ne!(unit_id("same words"), unit_id("other words"));
        assert_eq!(unit_id("x").len(), 16);
    }

    #[test]
    fn test_corpus_hash_tracks_counts() {
        assert_eq!(corpus_state_hash(3, 40), corpus_state_hash(3, 40));
        assert_ne!(corpus_state_hash(3, 40), corpus_state_hash(3, 41));
    }
}
