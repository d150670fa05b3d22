//! Content hashing and authenticated encryption at rest.
//!
//! An encrypted object is stored as one self-describing blob:
//! `salt(16) || nonce(12) || tag(16) || ciphertext`. The AES-256 key is
//! derived from the passphrase with PBKDF2-HMAC-SHA256 and the per-call
//! salt; the passphrase itself is never written next to the object.

use std::num::NonZeroU32;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
const HEADER_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

const PBKDF2_ITERATIONS: u32 = 600_000;

/// Hex SHA-256 of the plaintext, stored per version for dedup and drift
/// detection.
pub fn checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn verify_integrity(data: &[u8], expected: &str) -> bool {
    checksum(data) == expected
}

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap();
    ring::pbkdf2::derive(
        ring::pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        passphrase.as_bytes(),
        &mut key,
    );
    key
}

/// Encrypts `plaintext` under a key derived from `passphrase`, with a fresh
/// random salt and nonce per call.
pub fn seal(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut salt)
        .map_err(|_| EngineError::Integrity("randomness source failed".into()))?;
    rng.fill(&mut nonce_bytes)
        .map_err(|_| EngineError::Integrity("randomness source failed".into()))?;

    let key = derive_key(passphrase, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(&nonce_bytes);

    // aes-gcm appends the tag to the ciphertext; the stored layout keeps it
    // in the header instead.
    let sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| EngineError::Integrity(format!("encryption failed: {}", e)))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let mut blob = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(tag);
    blob.extend_from_slice(ciphertext);
    Ok(blob)
}

/// Decrypts a blob produced by [`seal`]. Any truncation, tampering or wrong
/// passphrase fails the authentication tag and is a hard error.
pub fn open(blob: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    if blob.len() < HEADER_LEN {
        return Err(EngineError::Integrity(
            "encrypted blob shorter than header".into(),
        ));
    }
    let (salt, rest) = blob.split_at(SALT_LEN);
    let (nonce_bytes, rest) = rest.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let key = derive_key(passphrase, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(nonce_bytes);

    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    cipher
        .decrypt(nonce, sealed.as_slice())
        .map_err(|_| EngineError::Integrity("authentication tag mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip_empty() {
        let blob = seal(b"", "passphrase").expect("seal");
        assert_eq!(open(&blob, "passphrase").expect("open"), b"");
    }

    #[test]
    fn tamper_is_detected() {
        let mut blob = seal(b"payload", "passphrase").expect("seal");
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(
            open(&blob, "passphrase"),
            Err(EngineError::Integrity(_))
        ));
    }

    #[test]
    fn wrong_passphrase_fails() {
        let blob = seal(b"payload", "right").expect("seal");
        assert!(matches!(open(&blob, "wrong"), Err(EngineError::Integrity(_))));
    }

    #[test]
    fn truncated_blob_fails() {
        assert!(matches!(
            open(&[0u8; HEADER_LEN - 1], "passphrase"),
            Err(EngineError::Integrity(_))
        ));
    }

    #[test]
    fn fresh_salt_and_nonce_per_call() {
        let a = seal(b"same input", "passphrase").expect("seal");
        let b = seal(b"same input", "passphrase").expect("seal");
        assert_ne!(a, b);
    }

    #[test]
    fn checksum_verifies() {
        let digest = checksum(b"hello");
        assert!(verify_integrity(b"hello", &digest));
        assert!(!verify_integrity(b"hellp", &digest));
    }

    proptest! {
        // KDF at full iteration count makes a wide case budget too slow.
        #![proptest_config(ProptestConfig::with_cases(8))]
        #[test]
        fn round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let blob = seal(&data, "property").unwrap();
            prop_assert_eq!(open(&blob, "property").unwrap(), data);
        }
    }
}
