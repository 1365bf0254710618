//! Encrypted conversation history.
//!
//! - `crypto`: PBKDF2 key derivation and AES-256-GCM sealing
//! - `store`: load / save / reset of the history file

pub mod crypto;
pub mod store;

pub use store::{HistoryError, HistoryStore};
