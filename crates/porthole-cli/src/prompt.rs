//! Interactive placeholder prompting

use porthole_launcher::{LauncherError, Prompter};
use std::io::Write;

/// Asks on the terminal for placeholder fields the connection info does
/// not cover.
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&self, field: &str) -> Result<String, LauncherError> {
        print!("{}: ", field);
        std::io::stdout()
            .flush()
            .map_err(|_| LauncherError::UnresolvedField(field.to_string()))?;

        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .map_err(|_| LauncherError::UnresolvedField(field.to_string()))?;

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
