//! Interactive read-eval-print loop.
//!
//! Reads one line at a time, skips blank lines, and runs a full session turn
//! for everything else. Ends on end-of-input or a read error; Ctrl+C ends the
//! process. A failed turn is reported and the loop carries on.

use crate::llm::CompletionBackend;
use crate::session::Session;
use std::io::{self, BufRead, Write};
use tracing::debug;

const PROMPT: &str = "> ";

/// Run the loop until `input` is exhausted.
pub async fn run<B, R, W>(session: &mut Session<B>, mut input: R, out: &mut W) -> io::Result<()>
where
    B: CompletionBackend,
    R: BufRead,
    W: Write,
{
    eprintln!("Entering REPL mode. Press Ctrl+C or Ctrl+D to exit.");

    let mut line = String::new();
    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => {
                writeln!(out)?;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }

        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }

        if let Err(e) = session.handle_prompt(prompt, out).await {
            eprintln!("Error: {:#}", anyhow::Error::new(e));
        }
    }

    debug!("REPL finished after {} messages", session.messages().len());
    Ok(())
}
