//! Terminal prompts.
//!
//! Interactive terminals get `dialoguer` prompts (hidden input for secrets).
//! Piped stdin falls back to plain line reads so the tool can be scripted.

use std::io::{self, BufRead, IsTerminal, Write};

use dialoguer::{Input, Password};

use crate::error::Result;

/// Read one line from `reader` and trim surrounding whitespace.
///
/// End of input yields an empty string.
pub fn read_secret_line<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Prompt for a secret without echo; falls back to a plain line read when
/// stdin is not a terminal or the hidden prompt fails.
pub fn prompt_secret(label: &str) -> Result<String> {
    if io::stdin().is_terminal() {
        match Password::new()
            .with_prompt(label)
            .allow_empty_password(true)
            .interact()
        {
            Ok(secret) => return Ok(secret.trim().to_string()),
            Err(e) => tracing::warn!(error = %e, "hidden input unavailable, reading plain text"),
        }
    }

    print_label(label)?;
    read_secret_line(&mut io::stdin().lock())
}

/// Prompt for a value with a default; an empty answer keeps the default.
pub fn prompt_text(label: &str, default: &str) -> Result<String> {
    if io::stdin().is_terminal() {
        let value: String = Input::new()
            .with_prompt(label)
            .default(default.to_string())
            .interact_text()
            .map_err(io::Error::from)?;
        return Ok(value.trim().to_string());
    }

    print_label(&format!("{label} [{default}]"))?;
    let value = read_secret_line(&mut io::stdin().lock())?;
    Ok(if value.is_empty() {
        default.to_string()
    } else {
        value
    })
}

fn print_label(label: &str) -> Result<()> {
    let mut out = io::stdout();
    write!(out, "{label}: ")?;
    out.flush()?;
    Ok(())
}
