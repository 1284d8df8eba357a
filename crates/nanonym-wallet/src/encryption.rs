//! AES-256-GCM sealing with an Argon2id password-derived key.
//!
//! # Wire format
//! ```text
//! nonce (12 bytes) || ciphertext + auth_tag
//! ```
//! The salt and KDF parameters travel in the store file header.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::StoreError;

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Minimum sealed payload size (nonce + auth tag).
const MIN_SEALED_LEN: usize = NONCE_LEN + 16;

/// Argon2id cost parameters, stored alongside the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Generate a random salt.
pub fn random_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a password with Argon2id.
pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, StoreError> {
    let argon_params = Params::new(params.memory_kib, params.iterations, params.parallelism, Some(32))
        .map_err(|e| StoreError::Encryption(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
    let mut key = Zeroizing::new([0u8; 32]);
    argon
        .hash_password_into(password, salt, &mut *key)
        .map_err(|e| StoreError::Encryption(e.to_string()))?;
    Ok(key)
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
    use rand::RngCore;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| StoreError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| StoreError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data produced by [`seal`]. A tag mismatch is reported as
/// [`StoreError::InvalidPassword`].
pub fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, StoreError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(StoreError::CorruptedFile(format!(
            "sealed data too short: {} < {MIN_SEALED_LEN}",
            sealed.len()
        )));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| StoreError::Encryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| StoreError::InvalidPassword)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cheap parameters so tests stay fast.
    pub(crate) fn fast_params() -> KdfParams {
        KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = derive_key(b"correct horse", &[1u8; SALT_LEN], &fast_params()).unwrap();
        let sealed = seal(&key, b"pseudonym records").unwrap();
        assert_eq!(open(&key, &sealed).unwrap(), b"pseudonym records");
    }

    #[test]
    fn empty_plaintext() {
        let key = derive_key(b"pw", &[1u8; SALT_LEN], &fast_params()).unwrap();
        let sealed = seal(&key, b"").unwrap();
        assert!(open(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn nonces_are_fresh() {
        let key = derive_key(b"pw", &[1u8; SALT_LEN], &fast_params()).unwrap();
        assert_ne!(seal(&key, b"x").unwrap(), seal(&key, b"x").unwrap());
    }

    #[test]
    fn wrong_password_fails() {
        let salt = random_salt();
        let key = derive_key(b"correct", &salt, &fast_params()).unwrap();
        let wrong = derive_key(b"wrong", &salt, &fast_params()).unwrap();
        let sealed = seal(&key, b"secret").unwrap();
        assert_eq!(open(&wrong, &sealed).unwrap_err(), StoreError::InvalidPassword);
    }

    #[test]
    fn salt_changes_key() {
        let a = derive_key(b"pw", &[1u8; SALT_LEN], &fast_params()).unwrap();
        let b = derive_key(b"pw", &[2u8; SALT_LEN], &fast_params()).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = derive_key(b"pw", &[1u8; SALT_LEN], &fast_params()).unwrap();
        let mut sealed = seal(&key, b"secret data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert_eq!(open(&key, &sealed).unwrap_err(), StoreError::InvalidPassword);
    }

    #[test]
    fn truncated_data_fails() {
        let key = derive_key(b"pw", &[1u8; SALT_LEN], &fast_params()).unwrap();
        assert!(matches!(open(&key, &[0u8; 10]), Err(StoreError::CorruptedFile(_))));
    }

    #[test]
    fn invalid_params_rejected() {
        let params = KdfParams {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            derive_key(b"pw", &[1u8; SALT_LEN], &params),
            Err(StoreError::Encryption(_))
        ));
    }
}
