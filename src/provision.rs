//! First-run setup.
//!
//! Runs only when no configuration exists at the default location and the
//! user is at a terminal. It writes a config file and prints the environment
//! variables to export; shell profiles are left for the user to edit.

use crate::config::{Config, API_KEY_ENV, DEFAULT_SYSTEM_PROMPT, PASSPHRASE_ENV};
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Ask for the essential settings on `input`, write them to `path` and
/// return the new configuration.
pub fn provision<R: BufRead, W: Write>(path: &Path, mut input: R, out: &mut W) -> Result<Config> {
    writeln!(out, "ivycli first-run setup")?;
    writeln!(out, "======================\n")?;
    writeln!(out, "No configuration found at {}.\n", path.display())?;

    let model = ask(&mut input, out, "Model", DEFAULT_MODEL)?;
    let system_prompt = ask(&mut input, out, "System prompt", DEFAULT_SYSTEM_PROMPT)?;

    let mut config = Config::with_model(model);
    config.system_prompt = system_prompt;
    config.save(path)?;
    writeln!(out, "\nCreated config at {}", path.display())?;

    print_environment_hints(out)?;
    Ok(config)
}

fn ask<R: BufRead, W: Write>(input: &mut R, out: &mut W, label: &str, default: &str) -> Result<String> {
    write!(out, "{} [{}]: ", label, default)?;
    out.flush()?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .with_context(|| format!("Failed to read {}", label.to_lowercase()))?;
    let answer = line.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

/// Print the exports the user should add to their shell profile.
fn print_environment_hints<W: Write>(out: &mut W) -> Result<()> {
    let shell = std::env::var("SHELL").unwrap_or_default();
    let profile = if shell.contains("zsh") {
        "~/.zshrc"
    } else if shell.contains("bash") {
        "~/.bashrc"
    } else if shell.contains("fish") {
        "~/.config/fish/config.fish"
    } else {
        "your shell profile"
    };

    writeln!(out, "\nAdd to {}:\n", profile)?;
    if shell.contains("fish") {
        writeln!(out, "set -gx {} <your-api-key>", API_KEY_ENV)?;
        writeln!(out, "set -gx {} <history-passphrase>", PASSPHRASE_ENV)?;
    } else {
        writeln!(out, "export {}=<your-api-key>", API_KEY_ENV)?;
        writeln!(out, "export {}=<history-passphrase>", PASSPHRASE_ENV)?;
    }
    writeln!(out, "\nThen restart your shell or source the file.")?;
    Ok(())
}
