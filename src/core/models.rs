//! Canonical data model.
//!
//! Every provider response is normalized into these types; nothing
//! provider-shaped crosses the normalizer boundary except [`RawPayload`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::provider::Provider;
use crate::error::{Result, UpkeepError};

// =============================================================================
// Credentials
// =============================================================================

/// A stored access token for one (user, provider) pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredential {
    pub user_id: String,
    pub provider: Provider,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl std::fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("token", &"<redacted>")
            .field("team_id", &self.team_id)
            .finish()
    }
}

// =============================================================================
// Applications
// =============================================================================

/// A user's tracked application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Primary hosting provider.
    pub provider: Provider,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated input for creating an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub user_id: String,
    pub name: String,
    pub url: Option<String>,
    pub provider: Provider,
    pub tags: Vec<String>,
}

/// A provider resource an application pulls deployment data from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBinding {
    pub application_id: i64,
    pub provider: Provider,
    /// Provider-specific resource name (see [`Provider::resource_hint`]).
    pub resource: String,
}

// =============================================================================
// Deployments
// =============================================================================

/// Canonical deployment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Queued,
    Building,
    Ready,
    Error,
    Canceled,
    Unknown,
}

impl DeploymentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Building => "building",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored value; anything unrecognized reads back as `Unknown`.
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        match value {
            "queued" => Self::Queued,
            "building" => Self::Building,
            "ready" => Self::Ready,
            "error" => Self::Error,
            "canceled" => Self::Canceled,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployment as produced by the normalizer, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeployment {
    pub application_id: i64,
    pub provider: Provider,
    pub external_id: String,
    pub status: DeploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted deployment, unique per (application, provider, external id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: i64,
    pub application_id: i64,
    pub provider: Provider,
    pub external_id: String,
    pub status: DeploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw provider pages as fetched, in provider order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub provider: Provider,
    pub pages: Vec<Value>,
    /// Set when pagination stopped at the page limit with more data available.
    pub partial: bool,
}

// =============================================================================
// Maintenance
// =============================================================================

/// An entry of the maintenance command catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceCommandType {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// Lifecycle state of a maintenance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl RunStatus {
    pub const ALL: &'static [Self] = &[
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Skipped,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parse command input.
    ///
    /// # Errors
    /// Returns a validation error for values outside the status enum.
    pub fn parse(value: &str) -> Result<Self> {
        let lower = value.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|s| s.as_str() == lower)
            .copied()
            .ok_or_else(|| {
                UpkeepError::validation("status", format!("unknown run status '{value}'"))
            })
    }

    /// Terminal runs are immutable.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Whether a live run may move from `self` to `next`.
    ///
    /// Same-status updates are allowed on non-terminal runs so notes and
    /// results can be amended while a run is tracked.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Pending | Self::Running | Self::Skipped),
            Self::Running => matches!(
                next,
                Self::Running | Self::Completed | Self::Failed | Self::Skipped
            ),
            Self::Completed | Self::Failed | Self::Skipped => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One maintenance run; append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRun {
    pub id: i64,
    pub application_id: i64,
    pub command_type_id: i64,
    pub status: RunStatus,
    /// Opaque diagnostic payload attached by the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub run_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for recording a maintenance run.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub application_id: i64,
    pub command_type_id: i64,
    pub status: RunStatus,
    pub results: Option<Value>,
    pub notes: Option<String>,
    pub run_at: DateTime<Utc>,
}

/// Current checklist state per (application, command type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceStatusItem {
    pub application_id: i64,
    pub command_type_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_id: Option<i64>,
    pub last_status: RunStatus,
    pub updated_at: DateTime<Utc>,
}

/// A checklist row: catalog entry plus its derived status, if any run finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistEntry {
    pub command_type: MaintenanceCommandType,
    pub item: Option<MaintenanceStatusItem>,
}

// =============================================================================
// Sync results
// =============================================================================

/// Per-provider sync outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Ok,
    Skipped,
    Failed,
}

/// Detail string for a provider without a stored credential.
pub const DETAIL_NO_CREDENTIAL: &str = "no-credential";

/// Detail string for a provider whose sync was cancelled.
pub const DETAIL_CANCELLED: &str = "cancelled";

/// What happened to one provider during a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutcome {
    pub status: SyncStatus,
    pub detail: String,
    /// Deployments persisted (0 unless `status` is ok).
    pub deployments: usize,
    /// Fetch attempts made.
    pub attempts: u32,
    /// Pagination was truncated.
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ProviderOutcome {
    #[must_use]
    pub fn ok(deployments: usize, attempts: u32, partial: bool) -> Self {
        let detail = if partial {
            format!("{deployments} deployments persisted (truncated)")
        } else {
            format!("{deployments} deployments persisted")
        };
        Self {
            status: SyncStatus::Ok,
            detail,
            deployments,
            attempts,
            partial,
            error_code: None,
        }
    }

    #[must_use]
    pub fn skipped(detail: &str, attempts: u32) -> Self {
        Self {
            status: SyncStatus::Skipped,
            detail: detail.to_string(),
            deployments: 0,
            attempts,
            partial: false,
            error_code: None,
        }
    }

    #[must_use]
    pub fn failed(error: &UpkeepError, attempts: u32) -> Self {
        Self {
            status: SyncStatus::Failed,
            detail: error.to_string(),
            deployments: 0,
            attempts,
            partial: false,
            error_code: Some(error.error_code().to_string()),
        }
    }
}

/// Aggregated result of one application sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub application_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub providers: BTreeMap<Provider, ProviderOutcome>,
}

impl SyncResult {
    /// Outcome for one provider, if it was configured.
    #[must_use]
    pub fn outcome(&self, provider: Provider) -> Option<&ProviderOutcome> {
        self.providers.get(&provider)
    }

    /// Number of providers that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.providers
            .values()
            .filter(|o| o.status == SyncStatus::Failed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_redacts_token() {
        let cred = ProviderCredential {
            user_id: "u1".to_string(),
            provider: Provider::Github,
            token: "ghp_supersecret".to_string(),
            team_id: None,
        };
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("ghp_supersecret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn run_status_parse_rejects_unknown() {
        assert_eq!(RunStatus::parse("Completed").unwrap(), RunStatus::Completed);
        assert!(matches!(
            RunStatus::parse("done"),
            Err(UpkeepError::Validation { .. })
        ));
    }

    #[test]
    fn terminal_states_accept_no_transition() {
        for &from in RunStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for &to in RunStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn live_transitions() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Skipped));
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Pending));
    }

    #[test]
    fn deployment_status_reads_unknown_for_garbage() {
        assert_eq!(DeploymentStatus::from_stored("ready"), DeploymentStatus::Ready);
        assert_eq!(DeploymentStatus::from_stored("???"), DeploymentStatus::Unknown);
    }

    #[test]
    fn sync_result_serializes_provider_keys_as_slugs() {
        let mut providers = BTreeMap::new();
        providers.insert(Provider::Vercel, ProviderOutcome::skipped(DETAIL_NO_CREDENTIAL, 0));
        let result = SyncResult {
            application_id: 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            providers,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["providers"]["vercel"]["status"], "skipped");
        assert_eq!(json["providers"]["vercel"]["detail"], "no-credential");
    }
}
