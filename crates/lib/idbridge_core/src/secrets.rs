//! Secrets handling: tenant credential encryption, bearer keys, token
//! material.
//!
//! Credentials are sealed with AES-256-GCM under a key derived from the
//! operator passphrase; the stored form is base64 of `nonce || ciphertext ||
//! tag`. Bearer keys are random and only their SHA-256 digest is persisted.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::distr::Alphanumeric;
use rand::{Rng, RngCore, rng};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

/// Length of tenant bearer keys.
pub const API_KEY_LEN: usize = 64;
/// Length of single-use token secrets.
pub const TOKEN_LEN: usize = 48;

/// Prefix that makes tenant bearer keys recognisable in logs and configs.
pub const API_KEY_PREFIX: &str = "idb_";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// Seals and opens tenant credentials.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(..)")
    }
}

impl CredentialCipher {
    /// Derive the AES key from a passphrase with SHA-256.
    pub fn new(passphrase: &str) -> Result<Self, SecretError> {
        let key = Sha256::digest(passphrase.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| SecretError::Encrypt(format!("key init: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, SecretError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| SecretError::Encrypt(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn open(&self, sealed_b64: &str) -> Result<String, SecretError> {
        let sealed = STANDARD
            .decode(sealed_b64)
            .map_err(|e| SecretError::Decrypt(format!("base64: {e}")))?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(SecretError::Decrypt("ciphertext too short".into()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| SecretError::Decrypt(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|e| SecretError::Decrypt(format!("utf-8: {e}")))
    }
}

/// Random alphanumeric string of `len` characters.
pub fn random_alphanumeric(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Fresh tenant bearer key.
pub fn generate_api_key() -> String {
    format!("{API_KEY_PREFIX}{}", random_alphanumeric(API_KEY_LEN))
}

/// SHA-256 hex digest, the stored form of a bearer key.
pub fn hash_api_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}
