//! On-disk store for the encrypted conversation history.

use super::crypto::{CryptoError, HistoryCipher};
use crate::message::Message;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// History store errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no conversation history at {0}")]
    NotFound(PathBuf),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history contents are not a valid message list: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HistoryError {
    /// True when the stored history exists but cannot be read back.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, HistoryError::Crypto(_) | HistoryError::Serialization(_))
    }
}

/// Encrypted history file at a fixed path.
///
/// The store persists exactly what it is given minus system messages; callers
/// decide how many turns to keep. Concurrent writers are last-writer-wins.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    cipher: HistoryCipher,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cipher: HistoryCipher::default(),
        }
    }

    #[cfg(test)]
    pub fn with_cipher(path: impl Into<PathBuf>, cipher: HistoryCipher) -> Self {
        Self {
            path: path.into(),
            cipher,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and decrypt the stored messages.
    pub fn load(&self, passphrase: &str) -> Result<Vec<Message>, HistoryError> {
        let blob = match std::fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HistoryError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let plaintext = self.cipher.open(&blob, passphrase)?;
        let messages: Vec<Message> = serde_json::from_slice(&plaintext)?;
        debug!("Loaded {} history messages from {}", messages.len(), self.path.display());
        Ok(messages)
    }

    /// Encrypt and write `messages`, replacing any previous file atomically.
    pub fn save(&self, messages: &[Message], passphrase: &str) -> Result<(), HistoryError> {
        let kept: Vec<&Message> = messages.iter().filter(|m| !m.is_system()).collect();
        let plaintext = serde_json::to_vec(&kept)?;
        let blob = self.cipher.seal(&plaintext, passphrase)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        crate::config::create_private_dir(dir)?;

        // NamedTempFile is created 0600 on unix; persist() renames over the target.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&blob)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!("Saved {} history messages to {}", kept.len(), self.path.display());
        Ok(())
    }

    /// Delete the history file. A missing file is not an error.
    pub fn reset(&self) -> Result<(), HistoryError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
