//! Provider payload normalization.
//!
//! One function per provider maps that provider's JSON onto [`NewDeployment`].
//! Normalization is pure and keeps the provider's ordering across pages.
//! States a provider invents later map to [`DeploymentStatus::Unknown`] so a
//! single odd deployment never aborts a sync. Items are decoded one at a
//! time: a field of the wrong type reads as absent, and an item that is not
//! an object at all is skipped.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::models::{DeploymentStatus, NewDeployment, RawPayload};
use super::provider::Provider;
use crate::error::{Result, UpkeepError};

/// Normalize a fetched payload into canonical deployments.
///
/// # Errors
/// Returns `ParseResponse` when a page does not have the provider's list shape.
pub fn normalize(application_id: i64, payload: &RawPayload) -> Result<Vec<NewDeployment>> {
    let mut out = Vec::new();
    for page in &payload.pages {
        match payload.provider {
            Provider::Github => github::normalize_page(application_id, page, &mut out)?,
            Provider::Vercel => vercel::normalize_page(application_id, page, &mut out)?,
            Provider::Cloudflare => cloudflare::normalize_page(application_id, page, &mut out)?,
        }
    }
    Ok(out)
}

fn parse_error(provider: Provider, err: &serde_json::Error) -> UpkeepError {
    UpkeepError::ParseResponse {
        provider: provider.slug().to_string(),
        message: err.to_string(),
    }
}

/// Field decoder that turns a value of the wrong type into `None`.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn decode_item<T: DeserializeOwned>(provider: Provider, item: Value) -> Option<T> {
    match serde_json::from_value(item) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::debug!(provider = %provider, error = %e, "Skipping undecodable item");
            None
        }
    }
}

/// Timestamp used when a provider omits one; keeps output deterministic.
fn missing_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

// =============================================================================
// GitHub
// =============================================================================

mod github {
    use super::{
        DateTime, Deserialize, DeploymentStatus, NewDeployment, Provider, Result, Utc, Value,
        decode_item, lenient, missing_timestamp, parse_error,
    };

    #[derive(Debug, Deserialize)]
    struct RunsPage {
        workflow_runs: Vec<Value>,
    }

    #[derive(Debug, Deserialize)]
    struct Run {
        #[serde(default, deserialize_with = "lenient")]
        id: Option<u64>,
        #[serde(default, deserialize_with = "lenient")]
        status: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        conclusion: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        head_sha: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        html_url: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        created_at: Option<DateTime<Utc>>,
    }

    pub(super) fn map_state(status: Option<&str>, conclusion: Option<&str>) -> DeploymentStatus {
        match status {
            Some("completed") => match conclusion {
                Some("success" | "neutral") => DeploymentStatus::Ready,
                Some("failure" | "timed_out" | "startup_failure" | "action_required") => {
                    DeploymentStatus::Error
                }
                Some("cancelled" | "skipped" | "stale") => DeploymentStatus::Canceled,
                _ => DeploymentStatus::Unknown,
            },
            Some("queued" | "waiting" | "pending" | "requested") => DeploymentStatus::Queued,
            Some("in_progress") => DeploymentStatus::Building,
            _ => DeploymentStatus::Unknown,
        }
    }

    pub(super) fn normalize_page(
        application_id: i64,
        page: &Value,
        out: &mut Vec<NewDeployment>,
    ) -> Result<()> {
        let page = RunsPage::deserialize(page).map_err(|e| parse_error(Provider::Github, &e))?;
        for run in page.workflow_runs {
            let Some(run) = decode_item::<Run>(Provider::Github, run) else {
                continue;
            };
            let Some(id) = run.id else {
                tracing::debug!(provider = "github", "Skipping workflow run without id");
                continue;
            };
            out.push(NewDeployment {
                application_id,
                provider: Provider::Github,
                external_id: id.to_string(),
                status: map_state(run.status.as_deref(), run.conclusion.as_deref()),
                url: run.html_url,
                commit_sha: run.head_sha,
                created_at: run.created_at.unwrap_or_else(missing_timestamp),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Vercel
// =============================================================================

mod vercel {
    use super::{
        DateTime, Deserialize, DeploymentStatus, NewDeployment, Provider, Result, Utc, Value,
        decode_item, lenient, missing_timestamp, parse_error,
    };

    #[derive(Debug, Deserialize)]
    struct DeploymentsPage {
        deployments: Vec<Value>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Item {
        #[serde(default, deserialize_with = "lenient")]
        uid: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        url: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        state: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        ready_state: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        created_at: Option<i64>,
        #[serde(default, deserialize_with = "lenient")]
        created: Option<i64>,
        #[serde(default, deserialize_with = "lenient")]
        meta: Option<Meta>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Meta {
        #[serde(default, deserialize_with = "lenient")]
        github_commit_sha: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        gitlab_commit_sha: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        bitbucket_commit_sha: Option<String>,
    }

    pub(super) fn map_state(state: Option<&str>) -> DeploymentStatus {
        match state.map(str::to_ascii_uppercase).as_deref() {
            Some("QUEUED" | "INITIALIZING") => DeploymentStatus::Queued,
            Some("BUILDING") => DeploymentStatus::Building,
            Some("READY") => DeploymentStatus::Ready,
            Some("ERROR") => DeploymentStatus::Error,
            Some("CANCELED") => DeploymentStatus::Canceled,
            _ => DeploymentStatus::Unknown,
        }
    }

    fn absolute_url(url: String) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url
        } else {
            format!("https://{url}")
        }
    }

    pub(super) fn normalize_page(
        application_id: i64,
        page: &Value,
        out: &mut Vec<NewDeployment>,
    ) -> Result<()> {
        let page =
            DeploymentsPage::deserialize(page).map_err(|e| parse_error(Provider::Vercel, &e))?;
        for item in page.deployments {
            let Some(item) = decode_item::<Item>(Provider::Vercel, item) else {
                continue;
            };
            let Some(uid) = item.uid else {
                tracing::debug!(provider = "vercel", "Skipping deployment without uid");
                continue;
            };
            let meta = item.meta.unwrap_or_default();
            let commit_sha = meta
                .github_commit_sha
                .or(meta.gitlab_commit_sha)
                .or(meta.bitbucket_commit_sha);
            let created_at = item
                .created_at
                .or(item.created)
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .unwrap_or_else(missing_timestamp);

            out.push(NewDeployment {
                application_id,
                provider: Provider::Vercel,
                external_id: uid,
                status: map_state(item.state.or(item.ready_state).as_deref()),
                url: item.url.map(absolute_url),
                commit_sha,
                created_at,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Cloudflare Pages
// =============================================================================

mod cloudflare {
    use super::{
        DateTime, Deserialize, DeploymentStatus, NewDeployment, Provider, Result, Utc, Value,
        decode_item, lenient, missing_timestamp, parse_error,
    };

    #[derive(Debug, Deserialize)]
    struct DeploymentsPage {
        result: Vec<Value>,
    }

    #[derive(Debug, Deserialize)]
    struct Item {
        #[serde(default, deserialize_with = "lenient")]
        id: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        url: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        created_on: Option<DateTime<Utc>>,
        #[serde(default, deserialize_with = "lenient")]
        latest_stage: Option<Stage>,
        #[serde(default, deserialize_with = "lenient")]
        deployment_trigger: Option<Trigger>,
    }

    #[derive(Debug, Deserialize)]
    struct Stage {
        #[serde(default, deserialize_with = "lenient")]
        name: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        status: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct Trigger {
        #[serde(default, deserialize_with = "lenient")]
        metadata: Option<TriggerMetadata>,
    }

    #[derive(Debug, Deserialize)]
    struct TriggerMetadata {
        #[serde(default, deserialize_with = "lenient")]
        commit_hash: Option<String>,
    }

    /// A stage other than `deploy` finishing successfully means the pipeline
    /// is still moving.
    pub(super) fn map_state(stage: Option<&str>, status: Option<&str>) -> DeploymentStatus {
        match status {
            Some("success") if stage == Some("deploy") => DeploymentStatus::Ready,
            Some("success" | "active") => DeploymentStatus::Building,
            Some("idle") => DeploymentStatus::Queued,
            Some("failure") => DeploymentStatus::Error,
            Some("canceled" | "skipped") => DeploymentStatus::Canceled,
            _ => DeploymentStatus::Unknown,
        }
    }

    pub(super) fn normalize_page(
        application_id: i64,
        page: &Value,
        out: &mut Vec<NewDeployment>,
    ) -> Result<()> {
        let page = DeploymentsPage::deserialize(page)
            .map_err(|e| parse_error(Provider::Cloudflare, &e))?;
        for item in page.result {
            let Some(item) = decode_item::<Item>(Provider::Cloudflare, item) else {
                continue;
            };
            let Some(id) = item.id else {
                tracing::debug!(provider = "cloudflare", "Skipping deployment without id");
                continue;
            };
            let (stage, status) = item
                .latest_stage
                .map_or((None, None), |s| (s.name, s.status));
            let commit_sha = item
                .deployment_trigger
                .and_then(|t| t.metadata)
                .and_then(|m| m.commit_hash);

            out.push(NewDeployment {
                application_id,
                provider: Provider::Cloudflare,
                external_id: id,
                status: map_state(stage.as_deref(), status.as_deref()),
                url: item.url,
                commit_sha,
                created_at: item.created_on.unwrap_or_else(missing_timestamp),
            });
        }
        Ok(())
    }
}
