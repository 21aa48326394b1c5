//! Robot-mode output (JSON).
//!
//! Every command wraps its data in the same envelope so scripts can rely on
//! `schemaVersion`, `command` and `data`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Schema version stamped on every envelope.
pub const SCHEMA_VERSION: &str = "upkeep.v1";

/// JSON envelope around command output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
}

impl<T> RobotOutput<T> {
    /// Create a new robot output envelope.
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            command: command.into(),
            data,
        }
    }
}

/// Render data as an enveloped JSON document.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn render_json<T: Serialize>(command: &str, data: &T, pretty: bool) -> Result<String> {
    let output = RobotOutput::new(command, data);
    if pretty {
        Ok(serde_json::to_string_pretty(&output)?)
    } else {
        Ok(serde_json::to_string(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn envelope_carries_schema_and_command() {
        let rendered = render_json("apps list", &json!([{"id": 1}]), false).unwrap();
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(parsed["command"], "apps list");
        assert_eq!(parsed["data"][0]["id"], 1);
        assert!(parsed["generatedAt"].is_string());
    }

    #[test]
    fn pretty_output_spans_lines() {
        let rendered = render_json("sync", &json!({"a": 1}), true).unwrap();
        assert!(rendered.contains('\n'));
    }
}
