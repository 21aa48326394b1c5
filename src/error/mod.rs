//! Error types for upkeep.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are grouped into categories:
//! - **Authentication**: missing, invalid or revoked provider credentials
//! - **Provider**: throttling, outages, unexpected responses
//! - **Network**: timeouts and transport failures talking to a provider
//! - **Maintenance**: illegal maintenance-run state changes
//! - **Validation**: malformed command input, unknown entities
//! - **Configuration**: config file parsing and invalid values
//! - **Internal**: storage, I/O and unclassified failures
//!
//! Each error has a stable error code (e.g., `UPK-A001`) for programmatic handling.
//!
//! Only the sync coordinator turns a provider error into a non-fatal result;
//! every other layer propagates these values unchanged.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential is missing, invalid or revoked.
    Authentication,
    /// Provider throttled, failed or answered unexpectedly.
    Provider,
    /// Timeout or transport failure.
    Network,
    /// Maintenance-run state machine violation.
    Maintenance,
    /// Malformed input or unknown entity.
    Validation,
    /// Configuration issues.
    Configuration,
    /// Storage, I/O, unclassified.
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Provider => "Provider error",
            Self::Network => "Network error",
            Self::Maintenance => "Maintenance error",
            Self::Validation => "Validation error",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Provider => "P",
            Self::Network => "N",
            Self::Maintenance => "M",
            Self::Validation => "V",
            Self::Configuration => "C",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the `upkeep` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Credential missing or rejected; re-authentication needed
    AuthRequired = 2,
    /// Invalid input, invalid transition, bad config
    InvalidInput = 3,
    /// Provider unreachable or timed out
    Unavailable = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for upkeep operations.
#[derive(Error, Debug)]
pub enum UpkeepError {
    // ==========================================================================
    // Authentication errors (Category: Authentication)
    // ==========================================================================
    /// No credential stored for a provider the caller required.
    #[error("no credential configured for {provider}")]
    AuthMissing { provider: String },

    /// Provider rejected the credential (401/403).
    #[error("credential rejected by {provider} (HTTP {status})")]
    AuthInvalid { provider: String, status: u16 },

    // ==========================================================================
    // Provider errors (Category: Provider)
    // ==========================================================================
    /// Rate limited by provider.
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Provider returned 5xx or could not be reached.
    #[error("provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    /// Provider returned an unexpected non-2xx status.
    #[error("provider {provider} returned HTTP {status}: {body}")]
    ProviderError {
        provider: String,
        status: u16,
        body: String,
    },

    /// Failed to parse a provider response.
    #[error("failed to parse {provider} response: {message}")]
    ParseResponse { provider: String, message: String },

    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// Provider call exceeded its timeout.
    #[error("request timeout after {seconds}s for {provider}")]
    Timeout { provider: String, seconds: u64 },

    // ==========================================================================
    // Maintenance errors (Category: Maintenance)
    // ==========================================================================
    /// Illegal maintenance-run state change.
    #[error("invalid transition for run {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: i64,
        from: String,
        to: String,
    },

    // ==========================================================================
    // Validation errors (Category: Validation)
    // ==========================================================================
    /// Malformed command input.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid { key: String, message: String },

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// Database operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UpkeepError {
    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a missing entity.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Map error to the binary's exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::AuthMissing { .. } | Self::AuthInvalid { .. } => ExitCode::AuthRequired,

            Self::InvalidTransition { .. }
            | Self::Validation { .. }
            | Self::NotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. } => ExitCode::InvalidInput,

            Self::Timeout { .. } | Self::ProviderUnavailable { .. } => ExitCode::Unavailable,

            Self::RateLimited { .. }
            | Self::ProviderError { .. }
            | Self::ParseResponse { .. }
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthMissing { .. } | Self::AuthInvalid { .. } => ErrorCategory::Authentication,

            Self::RateLimited { .. }
            | Self::ProviderUnavailable { .. }
            | Self::ProviderError { .. }
            | Self::ParseResponse { .. } => ErrorCategory::Provider,

            Self::Timeout { .. } => ErrorCategory::Network,

            Self::InvalidTransition { .. } => ErrorCategory::Maintenance,

            Self::Validation { .. } | Self::NotFound { .. } => ErrorCategory::Validation,

            Self::ConfigParse { .. } | Self::ConfigInvalid { .. } => ErrorCategory::Configuration,

            Self::Storage(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Returns a stable error code for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AuthMissing { .. } => "UPK-A001",
            Self::AuthInvalid { .. } => "UPK-A002",

            Self::RateLimited { .. } => "UPK-P001",
            Self::ProviderUnavailable { .. } => "UPK-P002",
            Self::ProviderError { .. } => "UPK-P003",
            Self::ParseResponse { .. } => "UPK-P020",

            Self::Timeout { .. } => "UPK-N001",

            Self::InvalidTransition { .. } => "UPK-M001",

            Self::Validation { .. } => "UPK-V001",
            Self::NotFound { .. } => "UPK-V002",

            Self::ConfigParse { .. } => "UPK-C001",
            Self::ConfigInvalid { .. } => "UPK-C002",

            Self::Storage(_) => "UPK-X001",
            Self::Io(_) => "UPK-X002",
            Self::Json(_) => "UPK-X003",
            Self::Other(_) => "UPK-X099",
        }
    }

    /// Returns whether the sync coordinator may retry the failed call.
    ///
    /// Only throttling, provider outages and timeouts qualify. Auth failures
    /// need the user to re-authenticate and are never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ProviderUnavailable { .. } | Self::Timeout { .. }
        )
    }

    /// Returns the retry-after duration if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the provider slug if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::AuthMissing { provider }
            | Self::AuthInvalid { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::ProviderUnavailable { provider, .. }
            | Self::ProviderError { provider, .. }
            | Self::ParseResponse { provider, .. }
            | Self::Timeout { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for UpkeepError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for upkeep operations.
pub type Result<T> = std::result::Result<T, UpkeepError>;
