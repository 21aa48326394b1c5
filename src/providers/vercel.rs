//! Vercel client.
//!
//! Lists deployments with `GET /v6/deployments?projectId=...`. Pagination is
//! cursor based: the body's `pagination.next` timestamp is sent back as
//! `until`. A credential's team id is forwarded as `teamId`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{PageOptions, ProviderClient, endpoint, get_page};
use crate::core::http::build_client;
use crate::core::models::{ProviderBinding, ProviderCredential, RawPayload};
use crate::core::provider::Provider;
use crate::error::{Result, UpkeepError};

const DEPLOYMENTS_PATH: &str = "/v6/deployments";

/// Vercel REST client.
#[derive(Debug, Clone)]
pub struct VercelClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct PageCursor {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<i64>,
}

impl VercelClient {
    /// Create a client against `base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.into(),
            timeout,
        })
    }
}

fn next_cursor(body: &Value) -> Option<i64> {
    PageCursor::deserialize(body)
        .ok()
        .and_then(|c| c.pagination)
        .and_then(|p| p.next)
}

#[async_trait]
impl ProviderClient for VercelClient {
    fn provider(&self) -> Provider {
        Provider::Vercel
    }

    fn deployments_path(&self, binding: &ProviderBinding) -> Result<String> {
        let project = binding.resource.trim();
        if project.is_empty() || project.contains('/') {
            return Err(UpkeepError::validation(
                "resource",
                format!(
                    "Vercel resource must be a {}, got '{}'",
                    Provider::Vercel.resource_hint(),
                    binding.resource
                ),
            ));
        }
        let mut url = endpoint(Provider::Vercel.default_base_url(), DEPLOYMENTS_PATH)?;
        url.query_pairs_mut().append_pair("projectId", project);
        Ok(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
    }

    async fn fetch_resource(
        &self,
        credential: &ProviderCredential,
        resource_path: &str,
        pages: &PageOptions,
    ) -> Result<RawPayload> {
        let headers = self.auth_headers(credential)?;

        let mut first = endpoint(&self.base_url, resource_path)?;
        {
            let mut query = first.query_pairs_mut();
            query.append_pair("limit", &pages.per_page.to_string());
            if let Some(team) = credential.team_id.as_deref() {
                query.append_pair("teamId", team);
            }
        }

        let mut payload = RawPayload {
            provider: Provider::Vercel,
            pages: Vec::new(),
            partial: false,
        };
        let mut url = first.clone();

        loop {
            let (_, body) = get_page(&self.http, Provider::Vercel, url, &headers, self.timeout).await?;
            let next = next_cursor(&body);
            payload.pages.push(body);

            let Some(until) = next else {
                break;
            };
            if payload.pages.len() >= pages.max_pages {
                tracing::debug!(
                    provider = "vercel",
                    pages = payload.pages.len(),
                    "Page limit reached, truncating"
                );
                payload.partial = true;
                break;
            }
            url = first.clone();
            url.query_pairs_mut().append_pair("until", &until.to_string());
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn next_cursor_reads_pagination() {
        assert_eq!(
            next_cursor(&json!({"deployments": [], "pagination": {"next": 1_700_000_000_000_i64}})),
            Some(1_700_000_000_000)
        );
        assert_eq!(next_cursor(&json!({"deployments": [], "pagination": {"next": null}})), None);
        assert_eq!(next_cursor(&json!({"deployments": []})), None);
    }

    #[test]
    fn deployments_path_rejects_slashes() {
        let client = VercelClient::new("https://api.vercel.com", Duration::from_secs(1)).unwrap();
        let mut binding = ProviderBinding {
            application_id: 1,
            provider: Provider::Vercel,
            resource: "prj_123".to_string(),
        };
        assert_eq!(
            client.deployments_path(&binding).unwrap(),
            "/v6/deployments?projectId=prj_123"
        );
        binding.resource = "team/prj".to_string();
        assert!(client.deployments_path(&binding).is_err());
    }

    #[test]
    fn deployments_path_encodes_project() {
        let client = VercelClient::new("https://api.vercel.com", Duration::from_secs(1)).unwrap();
        let binding = ProviderBinding {
            application_id: 1,
            provider: Provider::Vercel,
            resource: "web#1?x=%&y".to_string(),
        };
        assert_eq!(
            client.deployments_path(&binding).unwrap(),
            "/v6/deployments?projectId=web%231%3Fx%3D%25%26y"
        );
    }
}
