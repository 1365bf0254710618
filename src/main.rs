//! ivycli - A terminal chat client with encrypted conversation history.
//!
//! Sends a prompt (plus the system prompt and prior turns) to a
//! chat-completions endpoint and prints the reply. Turns are kept in an
//! AES-GCM encrypted history file between invocations.

mod config;
mod history;
mod llm;
mod message;
mod prompt;
mod provision;
mod render;
mod repl;
mod session;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use config::{Config, ConfigSource, API_KEY_ENV, CONFIG_PATH_ENV, PASSPHRASE_ENV};
use history::HistoryStore;
use llm::openai::OpenAIBackend;
use render::{parse_hex_color, Renderer};
use session::{PersistentHistory, Session};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ivycli")]
#[command(author, version, about = "A terminal chat client with encrypted conversation history")]
#[command(long_about = "Sends a prompt to a chat-completions model and prints the reply.\n\n\
    Requires OPENAI_API_KEY. Conversation history is encrypted with IVYCLI_PASSPHRASE \
    (or a passphrase entered at the terminal).")]
struct Cli {
    /// Prompt text; read from stdin when omitted
    #[arg(value_name = "PROMPT")]
    prompt: Vec<String>,

    /// Path to the JSON configuration file
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print replies verbatim instead of rendering markdown
    #[arg(long)]
    no_markdown: bool,

    /// Delete the stored conversation history
    #[arg(long)]
    reset_history: bool,

    /// Neither load nor save conversation history
    #[arg(long)]
    no_history: bool,

    /// Start an interactive session
    #[arg(short = 'r', long)]
    repl: bool,

    /// HTTP request timeout in seconds
    #[arg(short = 't', long, value_name = "SECS", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Enable debug logging on stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Initialize logging. Logs go to stderr so stdout carries only replies.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "ivycli=debug,reqwest=warn"
    } else {
        "ivycli=warn,reqwest=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let store = HistoryStore::new(Config::history_path()?);
    debug!("History file: {}", store.path().display());

    if reset_history(&cli, &store)? {
        return Ok(());
    }

    let api_key = require_api_key(std::env::var(API_KEY_ENV).ok())?;

    let config = load_config(cli.config.clone())?;
    info!("Using model {} at {}", config.model, config.api_url);

    let renderer = if config.enable_markdown && !cli.no_markdown {
        let color = config.response_color.as_deref().and_then(parse_hex_color);
        Renderer::new(true, color)
    } else {
        Renderer::plain()
    };

    let backend = OpenAIBackend::new(
        config.model.clone(),
        api_key,
        config.api_url.clone(),
        Duration::from_secs(cli.timeout),
    )?;

    let history = if cli.no_history {
        None
    } else {
        open_history(store)?
    };

    let (mut session, load_error) = Session::start(backend, &config, renderer, history);
    if let Some(e) = load_error {
        warn!("Failed to load conversation history: {}", e);
        eprintln!("Error loading conversation history: {}", e);
        if e.is_unreadable() {
            eprintln!("Continuing without history; the stored file is left untouched.");
        } else {
            eprintln!("Continuing without history.");
        }
    }
    debug!("History persistence enabled: {}", session.history_enabled());

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.repl {
        if !cli.prompt.is_empty() {
            if let Err(e) = session.handle_prompt(&cli.prompt.join(" "), &mut out).await {
                eprintln!("Error: {:#}", anyhow::Error::new(e));
            }
        }
        let stdin = io::stdin();
        repl::run(&mut session, stdin.lock(), &mut out).await?;
        return Ok(());
    }

    let prompt = batch_prompt(&cli.prompt)?;
    session.handle_prompt(&prompt, &mut out).await?;
    Ok(())
}

/// Delete the history file when `--reset-history` is given. Returns true
/// when that was the whole request and the process should exit.
fn reset_history(cli: &Cli, store: &HistoryStore) -> Result<bool> {
    if !cli.reset_history {
        return Ok(false);
    }
    store.reset().context("Failed to reset conversation history")?;
    eprintln!("Conversation history reset.");
    Ok(cli.prompt.is_empty() && !cli.repl)
}

fn require_api_key(value: Option<String>) -> Result<String> {
    value
        .filter(|k| !k.is_empty())
        .ok_or_else(|| anyhow!("{} must be set via environment variables.", API_KEY_ENV))
}

/// Resolve and load the configuration, running first-run setup when the
/// default config is missing and a user is at the terminal.
fn load_config(flag: Option<PathBuf>) -> Result<Config> {
    let env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let source = ConfigSource::resolve(flag, env)?;
    let path = source.path();

    if source.is_default() && !path.exists() {
        if prompt::stdin_is_terminal() {
            let stdin = io::stdin();
            let mut stderr = io::stderr();
            return provision::provision(path, stdin.lock(), &mut stderr);
        }
        bail!(
            "Config file must be specified via --config flag or {} environment variable \
             (nothing found at {}).",
            CONFIG_PATH_ENV,
            path.display()
        );
    }

    Ok(Config::load(path)?)
}

/// Obtain the history passphrase from the environment or the terminal.
fn open_history(store: HistoryStore) -> Result<Option<PersistentHistory>> {
    let passphrase = match std::env::var(PASSPHRASE_ENV) {
        Ok(p) if !p.is_empty() => p,
        _ if prompt::stdin_is_terminal() => {
            prompt::read_passphrase("Enter passphrase for conversation history encryption: ")?
        }
        _ => {
            eprintln!(
                "Warning: {} is not set; conversation history disabled.",
                PASSPHRASE_ENV
            );
            return Ok(None);
        }
    };

    if passphrase.is_empty() {
        eprintln!("Warning: empty passphrase; conversation history disabled.");
        return Ok(None);
    }

    Ok(Some(PersistentHistory { store, passphrase }))
}

/// The batch-mode prompt: trailing arguments, or all of stdin.
fn batch_prompt(words: &[String]) -> Result<String> {
    let prompt = if words.is_empty() {
        if prompt::stdin_is_terminal() {
            eprintln!("Enter your message (end with Ctrl+D):");
        }
        prompt::read_prompt(io::stdin().lock()).context("Error reading standard input")?
    } else {
        words.join(" ")
    };

    if prompt.trim().is_empty() {
        bail!("No prompt given.");
    }
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "ivycli",
            "--config",
            "/tmp/c.json",
            "--no-markdown",
            "--no-history",
            "--timeout",
            "5",
            "what",
            "is",
            "rust",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(cli.no_markdown && cli.no_history);
        assert!(!cli.repl && !cli.reset_history);
        assert_eq!(cli.timeout, 5);
        assert_eq!(cli.prompt.join(" "), "what is rust");
    }

    #[test]
    fn test_timeout_must_be_positive() {
        assert!(Cli::try_parse_from(["ivycli", "--timeout", "0"]).is_err());
        assert_eq!(Cli::try_parse_from(["ivycli"]).unwrap().timeout, 30);
    }

    #[test]
    fn test_batch_prompt_from_words() {
        let words = vec!["hello".to_string(), "there".to_string()];
        assert_eq!(batch_prompt(&words).unwrap(), "hello there");
        assert!(batch_prompt(&["  ".to_string()]).is_err());
    }

    #[test]
    fn test_reset_history_alone_needs_nothing_else() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.enc"));
        std::fs::write(store.path(), b"old").unwrap();

        let cli = Cli::try_parse_from(["ivycli", "--reset-history"]).unwrap();
        assert!(reset_history(&cli, &store).unwrap());
        assert!(!store.path().exists());

        // nothing stored is still a successful reset
        assert!(reset_history(&cli, &store).unwrap());
    }

    #[test]
    fn test_reset_history_then_continue() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.enc"));
        std::fs::write(store.path(), b"old").unwrap();

        let with_prompt = Cli::try_parse_from(["ivycli", "--reset-history", "hi"]).unwrap();
        assert!(!reset_history(&with_prompt, &store).unwrap());
        assert!(!store.path().exists());

        let repl = Cli::try_parse_from(["ivycli", "--reset-history", "--repl"]).unwrap();
        assert!(!reset_history(&repl, &store).unwrap());

        let untouched = Cli::try_parse_from(["ivycli", "hi"]).unwrap();
        std::fs::write(store.path(), b"old").unwrap();
        assert!(!reset_history(&untouched, &store).unwrap());
        assert!(store.path().exists());
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = require_api_key(None).unwrap_err();
        assert_eq!(err.to_string(), "OPENAI_API_KEY must be set via environment variables.");
        assert!(require_api_key(Some(String::new())).is_err());
        assert_eq!(require_api_key(Some("sk-test".to_string())).unwrap(), "sk-test");
    }
}
