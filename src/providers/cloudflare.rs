//! Cloudflare Pages client.
//!
//! Lists `GET /accounts/{account}/pages/projects/{project}/deployments`.
//! Pagination is page-numbered via `result_info.{page,total_pages}`.
//! Cloudflare wraps every body in `{success, errors, result}`; a 2xx with
//! `success: false` is reported as a provider error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{PageOptions, ProviderClient, endpoint, get_page, split_pair};
use crate::core::http::build_client;
use crate::core::models::{ProviderBinding, ProviderCredential, RawPayload};
use crate::core::provider::Provider;
use crate::error::{Result, UpkeepError};

/// Cloudflare REST client.
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

const fn default_success() -> bool {
    true
}

impl CloudflareClient {
    /// Create a client against `base_url` (including `/client/v4`).
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

/// Next page number, if the envelope says there is one.
fn next_page(envelope: &Envelope) -> Option<u32> {
    let info = envelope.result_info.as_ref()?;
    (info.page < info.total_pages).then_some(info.page + 1)
}

#[async_trait]
impl ProviderClient for CloudflareClient {
    fn provider(&self) -> Provider {
        Provider::Cloudflare
    }

    fn deployments_path(&self, binding: &ProviderBinding) -> Result<String> {
        let (account, project) = split_pair(Provider::Cloudflare, &binding.resource)?;
        Ok(format!(
            "/accounts/{account}/pages/projects/{project}/deployments"
        ))
    }

    async fn fetch_resource(
        &self,
        credential: &ProviderCredential,
        resource_path: &str,
        pages: &PageOptions,
    ) -> Result<RawPayload> {
        let headers = self.auth_headers(credential)?;
        let base = endpoint(&self.base_url, resource_path)?;

        let mut payload = RawPayload {
            provider: Provider::Cloudflare,
            pages: Vec::new(),
            partial: false,
        };
        let mut page = 1_u32;

        loop {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &pages.per_page.to_string());

            let (_, body) =
                get_page(&self.http, Provider::Cloudflare, url, &headers, self.timeout).await?;

            let envelope = Envelope::deserialize(&body).map_err(|e| UpkeepError::ParseResponse {
                provider: "cloudflare".to_string(),
                message: e.to_string(),
            })?;
            if !envelope.success {
                return Err(UpkeepError::ProviderError {
                    provider: "cloudflare".to_string(),
                    status: 200,
                    body: serde_json::to_string(&envelope.errors)?,
                });
            }

            let next = next_page(&envelope);
            payload.pages.push(body);

            let Some(next) = next else {
                break;
            };
            if payload.pages.len() >= pages.max_pages {
                tracing::debug!(
                    provider = "cloudflare",
                    pages = payload.pages.len(),
                    "Page limit reached, truncating"
                );
                payload.partial = true;
                break;
            }
            page = next;
        }

        Ok(payload)
    }
}
