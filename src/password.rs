//! Link password hashes.
//!
//! Stored as `salt_hex:sha256_hex`, where the digest covers the salt's hex text
//! followed by the password. Older rows hold a bare unsalted SHA-256 hex digest;
//! those still verify and are only replaced when the owner sets a new password.

use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash `password` under a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_hex = hex::encode(salt);

    let digest = sha256_hex(&format!("{salt_hex}{password}"));
    format!("{salt_hex}:{digest}")
}

/// Check `password` against a stored salted or legacy hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once(':') {
        Some((salt, digest)) if !digest.is_empty() => {
            sha256_hex(&format!("{salt}{password}")) == digest
        }
        _ => sha256_hex(password) == stored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salted_hash_round_trips() {
        let stored = hash_password("secret");
        assert!(verify_password("secret", &stored));
        assert!(!verify_password("wrong", &stored));
    }

    #[test]
    fn salted_hash_layout() {
        let stored = hash_password("secret");
        let (salt, digest) = stored.split_once(':').unwrap();
        assert_eq!(salt.len(), 32);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, sha256_hex(&format!("{salt}secret")));
    }

    #[test]
    fn salts_differ_between_calls() {
        assert_ne!(hash_password("secret"), hash_password("secret"));
    }

    #[test]
    fn legacy_unsalted_hash_still_verifies() {
        // SHA-256("secret")
        let legacy = "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b";
        assert!(verify_password("secret", legacy));
        assert!(!verify_password("Secret", legacy));
    }
}
