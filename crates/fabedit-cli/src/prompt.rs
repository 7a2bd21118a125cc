//! Interactive prompts

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Result;

/// Ask for confirmation
///
/// Returns false without asking when stdin is not a terminal.
pub fn confirm(prompt: &str) -> Result<bool> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    read_answer(&mut stdin.lock())
}

/// Read one line and interpret it as a yes/no answer
fn read_answer(reader: &mut impl BufRead) -> Result<bool> {
    let mut input = String::new();
    reader.read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
