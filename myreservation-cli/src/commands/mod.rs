mod auth;
mod config_cmd;
mod reservation;
mod shell;

use clap::ValueEnum;
use std::io::{self, BufRead, Write};

pub use auth::AuthCommand;
pub use config_cmd::ConfigCommand;
pub use reservation::{DeleteCommand, ListCommand, NewCommand, WatchCommand};
pub use shell::ShellCommand;

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Prints `label` and reads one trimmed line.
pub(crate) fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
) -> io::Result<String> {
    write!(out, "{}", label)?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// True for `y` or `yes`, in any case.
pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
