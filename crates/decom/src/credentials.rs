//! Operator credential collection and typed confirmations.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{anyhow, bail, Result};
use decom_core::errors::DecomError;
use decom_core::traits::Credential;

pub const SECRET_ENV: &str = "DECOM_SECRET";

/// Build the run credential. The secret comes from `DECOM_SECRET` or an
/// interactive prompt; it is never accepted as a command-line argument.
pub fn collect(username: Option<&str>) -> Result<Credential> {
    let username = match username.map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => u.to_string(),
        None if io::stdin().is_terminal() => prompt_line("Username (DOMAIN\\user): ")?,
        None => bail!("username required; supply --username or DECOM_USER when running non-interactively"),
    };
    if username.is_empty() {
        bail!("username cannot be empty");
    }

    if let Ok(secret) = std::env::var(SECRET_ENV) {
        if secret.is_empty() {
            bail!("{SECRET_ENV} is set but empty");
        }
        return Ok(Credential::new(username, secret));
    }

    if !io::stdin().is_terminal() {
        bail!("password required; supply {SECRET_ENV} when running non-interactively");
    }
    let secret = rpassword::prompt_password(format!("Password for {username}: "))
        .map_err(|e| anyhow!("failed to read password from terminal: {e}"))?;
    if secret.is_empty() {
        bail!("password cannot be empty");
    }
    Ok(Credential::new(username, secret))
}

/// Require the operator to type `expected` exactly.
///
/// A token passed on the command line is checked without prompting.
/// Anything else, including EOF, cancels.
pub fn confirm(prompt: &str, expected: &str, supplied: Option<&str>) -> Result<(), DecomError> {
    let typed = match supplied {
        Some(token) => token.to_string(),
        None if io::stdin().is_terminal() => {
            prompt_line(&format!("{prompt}\nType {expected} to continue: "))
                .map_err(|_| DecomError::Cancelled)?
        }
        None => return Err(DecomError::Cancelled),
    };
    if matches_token(&typed, expected) {
        Ok(())
    } else {
        Err(DecomError::Cancelled)
    }
}

fn matches_token(typed: &str, expected: &str) -> bool {
    typed.trim() == expected
}

pub fn prompt_line(prompt: &str) -> Result<String> {
    let mut out = io::stdout();
    write!(out, "{prompt}")?;
    out.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        bail!("input closed");
    }
    Ok(line.trim().to_string())
}
