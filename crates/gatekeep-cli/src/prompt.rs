//! Terminal prompts.

use std::io::{self, Write};

use anyhow::Result;

use crate::validation::FieldError;

/// Attempts before a rejected field aborts the command
const MAX_ATTEMPTS: usize = 3;

/// Prompt for a line of input, offering `default` when the answer is empty
pub fn line(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) => print!("{} [{}]: ", label, d),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match default {
        Some(d) if input.is_empty() => d.to_string(),
        _ => input.to_string(),
    })
}

pub fn password(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(format!("{}: ", label))?)
}

/// Ask until the answer passes `check`, printing the field error inline
pub fn validated(
    mut ask: impl FnMut() -> Result<String>,
    check: impl Fn(&str) -> Result<(), FieldError>,
) -> Result<String> {
    let mut attempt = 1;
    loop {
        let value = ask()?;
        match check(&value) {
            Ok(()) => return Ok(value),
            Err(e) if attempt >= MAX_ATTEMPTS => return Err(e.into()),
            Err(e) => eprintln!("  {}", e),
        }
        attempt += 1;
    }
}

pub fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}
