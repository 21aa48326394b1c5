//! Error rendering.
//!
//! Plain text for humans, a structured object for `--json`.

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::UpkeepError;

/// Render an error for the given output format.
#[must_use]
pub fn render_error(error: &UpkeepError, format: OutputFormat, pretty: bool) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, pretty),
        OutputFormat::Human => render_simple(error),
    }
}

/// Render error as structured JSON for machine consumption.
#[must_use]
pub fn render_error_json(error: &UpkeepError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error))
}

fn render_simple(error: &UpkeepError) -> String {
    let mut lines = vec![format!("Error [{}]: {error}", error.error_code())];
    if let Some(hint) = hint(error) {
        lines.push(format!("Fix: {hint}"));
    }
    lines.join("\n")
}

/// One-line remedy for errors the user can act on.
fn hint(error: &UpkeepError) -> Option<String> {
    match error {
        UpkeepError::AuthMissing { provider } | UpkeepError::AuthInvalid { provider, .. } => Some(
            format!("upkeep credentials set {provider} --token <TOKEN>"),
        ),
        UpkeepError::ConfigParse { path, .. } => Some(format!("check the TOML syntax in {path}")),
        UpkeepError::InvalidTransition { run_id, .. } => Some(format!(
            "run {run_id} can no longer change; record a new run instead"
        )),
        _ => None,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorJson {
    error_code: &'static str,
    category: &'static str,
    message: String,
    is_retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl ErrorJson {
    fn from_error(error: &UpkeepError) -> Self {
        Self {
            error_code: error.error_code(),
            category: error.category().description(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            provider: error.provider().map(String::from),
            retry_after_seconds: error.retry_after().map(|d| d.as_secs()),
            hint: hint(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;

    #[test]
    fn simple_render_includes_error_code() {
        let err = UpkeepError::not_found("application", 4);
        let output = render_error(&err, OutputFormat::Human, false);
        assert!(output.starts_with("Error [UPK-V002]"));
        assert!(output.contains("application 4 not found"));
    }

    #[test]
    fn auth_errors_suggest_reconnecting() {
        let err = UpkeepError::AuthInvalid {
            provider: "github".to_string(),
            status: 401,
        };
        let output = render_error(&err, OutputFormat::Human, false);
        assert!(output.contains("Fix: upkeep credentials set github"));
    }

    #[test]
    fn json_render_is_structured() {
        let err = UpkeepError::RateLimited {
            provider: "vercel".to_string(),
            retry_after: Some(Duration::from_secs(30)),
            message: "slow down".to_string(),
        };
        let parsed: Value = serde_json::from_str(&render_error_json(&err, false)).unwrap();
        assert_eq!(parsed["errorCode"], "UPK-P001");
        assert_eq!(parsed["isRetryable"], true);
        assert_eq!(parsed["provider"], "vercel");
        assert_eq!(parsed["retryAfterSeconds"], 30);
    }
}
