//! Token fingerprints for logs.
//!
//! Raw tokens never leave the credential store. When a log line needs to tell
//! two credentials apart it carries a short SHA-256 prefix instead.

use sha2::{Digest, Sha256};

/// Hex characters kept from the digest.
const FINGERPRINT_LEN: usize = 12;

/// Short, stable, non-reversible identifier for a token.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut encoded = hex::encode(&digest[..FINGERPRINT_LEN / 2]);
    encoded.truncate(FINGERPRINT_LEN);
    encoded
}
