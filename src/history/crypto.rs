//! Passphrase-based authenticated encryption for the history file.
//!
//! Layout: `salt(16) || nonce(12) || ciphertext+tag(16)`. The key is derived
//! with PBKDF2-HMAC-SHA256 from the passphrase and the salt. A fresh salt and
//! nonce are drawn for every seal.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Errors from sealing or opening a history blob.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("history data too short ({len} bytes, need at least {min})")]
    TooShort { len: usize, min: usize },

    #[error("failed to decrypt history (wrong passphrase or corrupted file)")]
    Authentication,

    #[error("failed to encrypt history")]
    Encryption,
}

/// Key derivation parameters plus AES-256-GCM seal/open.
#[derive(Debug, Clone, Copy)]
pub struct HistoryCipher {
    rounds: u32,
}

impl Default for HistoryCipher {
    fn default() -> Self {
        Self {
            rounds: PBKDF2_ROUNDS,
        }
    }
}

impl HistoryCipher {
    /// Cipher with a custom PBKDF2 round count. Blobs only open with the
    /// round count they were sealed with.
    #[cfg(test)]
    pub fn with_rounds(rounds: u32) -> Self {
        Self { rounds }
    }

    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, self.rounds, &mut key);
        key
    }

    /// Encrypt `plaintext` under `passphrase`.
    pub fn seal(&self, plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let mut key = self.derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        key.fill(0);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`HistoryCipher::seal`]. Never returns
    /// unauthenticated plaintext.
    pub fn open(&self, blob: &[u8], passphrase: &str) -> Result<Vec<u8>, CryptoError> {
        let min = SALT_LEN + NONCE_LEN;
        if blob.len() < min {
            return Err(CryptoError::TooShort {
                len: blob.len(),
                min,
            });
        }
        let (salt, rest) = blob.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let mut key = self.derive_key(passphrase, salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        key.fill(0);

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Authentication)
    }
}
