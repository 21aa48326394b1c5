//! GitHub client.
//!
//! Deployment state comes from Actions workflow runs
//! (`GET /repos/{owner}/{repo}/actions/runs`). Pagination follows the
//! `Link: <...>; rel="next"` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, Url};

use super::{PageOptions, ProviderClient, bearer_headers, endpoint, get_page, split_pair};
use crate::core::http::{build_client, next_link};
use crate::core::models::{ProviderBinding, ProviderCredential, RawPayload};
use crate::core::provider::Provider;
use crate::error::{Result, UpkeepError};

/// REST API version pinned in every request.
pub const API_VERSION: &str = "2022-11-28";

const API_VERSION_HEADER: &str = "x-github-api-version";
const MEDIA_TYPE: &str = "application/vnd.github+json";

/// GitHub REST client.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl GithubClient {
    /// Create a client against `base_url` (GitHub Enterprise needs `/api/v3`).
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

#[async_trait]
impl ProviderClient for GithubClient {
    fn provider(&self) -> Provider {
        Provider::Github
    }

    fn auth_headers(&self, credential: &ProviderCredential) -> Result<HeaderMap> {
        let mut headers = bearer_headers(&credential.token)?;
        headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_TYPE));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    fn deployments_path(&self, binding: &ProviderBinding) -> Result<String> {
        let (owner, repo) = split_pair(Provider::Github, &binding.resource)?;
        Ok(format!("/repos/{owner}/{repo}/actions/runs"))
    }

    async fn fetch_resource(
        &self,
        credential: &ProviderCredential,
        resource_path: &str,
        pages: &PageOptions,
    ) -> Result<RawPayload> {
        let headers = self.auth_headers(credential)?;

        let mut url = endpoint(&self.base_url, resource_path)?;
        let origin = url.origin();
        url.query_pairs_mut()
            .append_pair("per_page", &pages.per_page.to_string());

        let mut payload = RawPayload {
            provider: Provider::Github,
            pages: Vec::new(),
            partial: false,
        };

        loop {
            let (response_headers, body) =
                get_page(&self.http, Provider::Github, url, &headers, self.timeout).await?;
            payload.pages.push(body);

            let Some(next) = next_link(&response_headers) else {
                break;
            };
            if payload.pages.len() >= pages.max_pages {
                tracing::debug!(
                    provider = "github",
                    pages = payload.pages.len(),
                    "Page limit reached, truncating"
                );
                payload.partial = true;
                break;
            }
            let next = Url::parse(&next).map_err(|e| UpkeepError::ParseResponse {
                provider: "github".to_string(),
                message: format!("bad Link target '{next}': {e}"),
            })?;
            // The bearer header only ever goes to the configured host.
            if next.origin() != origin {
                tracing::warn!(
                    provider = "github",
                    target = %next.origin().ascii_serialization(),
                    "Link target leaves the API host, stopping pagination"
                );
                payload.partial = true;
                break;
            }
            url = next;
        }

        Ok(payload)
    }
}
