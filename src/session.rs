//! Conversation session: assemble, exchange, render, persist.
//!
//! One `Session` backs both batch mode (a single turn) and the REPL (many
//! turns). The in-memory buffer grows for the life of the process; what is
//! written to disk is capped to the most recent `max_history_size` turns.

use crate::config::Config;
use crate::history::{HistoryError, HistoryStore};
use crate::llm::{CompletionBackend, ExchangeError};
use crate::message::{assemble, persistable, Message};
use crate::render::Renderer;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, warn};

/// History store plus the passphrase that unlocks it.
///
/// The passphrase is kept for the whole session because every turn is saved;
/// its bytes are zeroed when the session ends.
pub struct PersistentHistory {
    pub store: HistoryStore,
    pub passphrase: String,
}

impl Drop for PersistentHistory {
    fn drop(&mut self) {
        wipe(std::mem::take(&mut self.passphrase));
    }
}

/// Overwrite the bytes of `secret` with zeros and hand back the buffer.
fn wipe(secret: String) -> Vec<u8> {
    let mut bytes = secret.into_bytes();
    bytes.fill(0);
    std::hint::black_box(bytes)
}

/// Why a turn produced no reply.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("failed to write reply: {0}")]
    Output(#[from] std::io::Error),
}

pub struct Session<B> {
    backend: B,
    renderer: Renderer,
    max_history_size: usize,
    messages: Vec<Message>,
    history: Option<PersistentHistory>,
}

impl<B: CompletionBackend> Session<B> {
    /// Start a session, loading persisted history when `history` is given.
    ///
    /// A missing history file starts an empty conversation. Any other load
    /// failure is returned alongside the session, which then runs without
    /// history and never writes the file.
    pub fn start(
        backend: B,
        config: &Config,
        renderer: Renderer,
        history: Option<PersistentHistory>,
    ) -> (Self, Option<HistoryError>) {
        let mut load_error = None;
        let mut loaded = Vec::new();

        let history = match history {
            None => None,
            Some(h) => match h.store.load(&h.passphrase) {
                Ok(messages) => {
                    loaded = messages;
                    Some(h)
                }
                Err(HistoryError::NotFound(path)) => {
                    debug!("No history at {}, starting fresh", path.display());
                    Some(h)
                }
                Err(e) => {
                    load_error = Some(e);
                    None
                }
            },
        };

        let messages = assemble(config.system_prompt(), &loaded, config.max_history_size);
        debug!(
            "Session started with {} messages via {} backend",
            messages.len(),
            backend.name()
        );

        let session = Self {
            backend,
            renderer,
            max_history_size: config.max_history_size,
            messages,
            history,
        };
        (session, load_error)
    }

    /// Whether replies are being persisted.
    pub fn history_enabled(&self) -> bool {
        self.history.is_some()
    }

    /// The current conversation buffer.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Run one turn: send `prompt` with the conversation so far, write the
    /// rendered reply to `out` and persist the updated history.
    ///
    /// A failed exchange leaves the conversation unchanged. History save
    /// failures are reported on stderr and do not fail the turn.
    pub async fn handle_prompt<W: Write>(&mut self, prompt: &str, out: &mut W) -> Result<(), TurnError> {
        self.messages.push(Message::user(prompt));

        let reply = match self.backend.complete(&self.messages).await {
            Ok(reply) => reply,
            Err(e) => {
                self.messages.pop();
                return Err(e.into());
            }
        };

        if let Err(e) = self.renderer.write_reply(out, &reply) {
            self.messages.pop();
            return Err(e.into());
        }

        self.messages.push(Message::assistant(reply));
        if let Err(e) = self.persist() {
            warn!("Failed to save conversation history: {}", e);
            eprintln!("Error saving conversation history: {}", e);
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), HistoryError> {
        let Some(history) = &self.history else {
            return Ok(());
        };
        let kept = persistable(&self.messages, self.max_history_size);
        history.store.save(&kept, &history.passphrase)
    }
}
