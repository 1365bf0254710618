//! Completion backends.
//!
//! The exchange with the remote model is a single capability: send the
//! conversation, get back the assistant's reply or a classified error.
//! [`openai::OpenAIBackend`] talks HTTPS; tests use a scripted stand-in.

pub mod openai;
#[cfg(test)]
pub mod scripted;

use crate::message::Message;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure modes of a completion exchange.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to create HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("error sending request")]
    Network(#[source] reqwest::Error),

    /// Non-success status with a conventional `{"error": {"message": ...}}` body.
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    /// Non-success status without a readable error envelope.
    #[error("received non-success response status: {0}")]
    Status(String),

    #[error("error decoding response: {0}")]
    Decode(String),

    #[error("unexpected response format: {0}")]
    UnexpectedFormat(&'static str),
}

/// A model endpoint that turns a conversation into one assistant reply.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Send `messages` and return the trimmed reply text.
    async fn complete(&self, messages: &[Message]) -> Result<String, ExchangeError>;
}
