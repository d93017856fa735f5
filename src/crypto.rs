//! Token encryption module using AES-256-GCM
//!
//! This module provides the encryption service used to protect OAuth
//! credential blobs at rest, plus a SHA-256 fingerprint helper. Ciphertext
//! is a base64 string of `version byte || nonce || ciphertext+tag`.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Symmetric encryption service keyed by a single process-wide secret.
#[derive(Clone)]
pub struct EncryptionService {
    key: CryptoKey,
}

impl EncryptionService {
    pub fn new(key: CryptoKey) -> Self {
        Self { key }
    }

    /// Encrypt a plaintext string, returning a base64 ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher_key = Key::<Aes256Gcm>::from_slice(self.key.as_bytes());
        let cipher = Aes256Gcm::new(cipher_key);

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let mut ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        // Prepend version byte and nonce to ciphertext
        let mut payload = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
        payload.push(VERSION_ENCRYPTED);
        payload.extend_from_slice(&nonce);
        payload.append(&mut ciphertext);

        Ok(BASE64.encode(payload))
    }

    /// Decrypt a base64 ciphertext produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails on a wrong key, a truncated or tampered payload, and on an
    /// empty recovered plaintext: callers only ever store non-empty JSON,
    /// so empty output means the stored value is corrupt.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        if ciphertext.is_empty() {
            return Err(CryptoError::EmptyCiphertext);
        }

        let payload = BASE64
            .decode(ciphertext)
            .map_err(|_| CryptoError::InvalidFormat)?;

        // Validate version marker and minimum length (version + nonce + tag)
        if payload.len() < MIN_ENCRYPTED_LEN || payload[0] != VERSION_ENCRYPTED {
            return Err(CryptoError::InvalidFormat);
        }

        let nonce = Nonce::from_slice(&payload[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
        let tag_and_ct = &payload[VERSION_FIELD_LEN + NONCE_LEN..];

        let cipher_key = Key::<Aes256Gcm>::from_slice(self.key.as_bytes());
        let cipher = Aes256Gcm::new(cipher_key);

        let plaintext_bytes = cipher
            .decrypt(nonce, tag_and_ct)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        let plaintext = String::from_utf8(plaintext_bytes)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))?;

        if plaintext.is_empty() {
            return Err(CryptoError::DecryptionFailed(
                "recovered plaintext is empty".to_string(),
            ));
        }

        Ok(plaintext)
    }

    /// JSON-serialize a value and encrypt the result.
    pub fn encrypt_object<T: Serialize>(&self, value: &T) -> Result<String, CryptoError> {
        let json = serde_json::to_string(value)?;
        self.encrypt(&json)
    }

    /// Decrypt a ciphertext and JSON-parse the recovered plaintext.
    pub fn decrypt_object<T: DeserializeOwned>(&self, ciphertext: &str) -> Result<T, CryptoError> {
        let json = self.decrypt(ciphertext)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// One-way SHA-256 fingerprint of the input, hex encoded.
    pub fn hash(&self, input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        hex::encode(hasher.finalize())
    }
}
