//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::Result;

/// Render command output: JSON envelope in robot mode, `human` otherwise.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn render<T, F>(command: &str, data: &T, format: OutputFormat, pretty: bool, human: F) -> Result<String>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Json => robot::render_json(command, data, pretty),
        OutputFormat::Human => Ok(human(data)),
    }
}
