//! Provider API clients.
//!
//! Each provider has its own submodule implementing [`ProviderClient`]: how to
//! authenticate, where a binding's deployments live, and how that provider
//! paginates.

pub mod cloudflare;
pub mod github;
pub mod vercel;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use serde_json::Value;

use crate::core::http::{classify_response, map_send_error};
use crate::core::models::{ProviderBinding, ProviderCredential, RawPayload};
use crate::core::provider::Provider;
use crate::error::{Result, UpkeepError};

pub use cloudflare::CloudflareClient;
pub use github::GithubClient;
pub use vercel::VercelClient;

/// Default page limit per fetch.
pub const DEFAULT_MAX_PAGES: usize = 5;

/// Default items requested per page.
pub const DEFAULT_PER_PAGE: u32 = 50;

/// Pagination bounds for one `fetch_resource` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    /// Stop after this many pages and mark the payload partial.
    pub max_pages: usize,
    pub per_page: u32,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Capability shared by all provider clients.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider this client talks to.
    fn provider(&self) -> Provider;

    /// Auth headers for a credential.
    ///
    /// # Errors
    /// Returns a validation error if the token cannot be sent as a header.
    fn auth_headers(&self, credential: &ProviderCredential) -> Result<HeaderMap> {
        bearer_headers(&credential.token)
    }

    /// Resource path listing a binding's deployments, relative to the base URL.
    ///
    /// # Errors
    /// Returns a validation error if the binding's resource is malformed.
    fn deployments_path(&self, binding: &ProviderBinding) -> Result<String>;

    /// Fetch a resource, following pagination up to `pages.max_pages`.
    ///
    /// # Errors
    /// `AuthInvalid`, `RateLimited`, `ProviderUnavailable`, `Timeout`,
    /// `ProviderError` or `ParseResponse`, per the provider's answer.
    async fn fetch_resource(
        &self,
        credential: &ProviderCredential,
        resource_path: &str,
        pages: &PageOptions,
    ) -> Result<RawPayload>;
}

/// `Authorization: Bearer <token>`, marked sensitive so it is never printed.
pub(crate) fn bearer_headers(token: &str) -> Result<HeaderMap> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
        UpkeepError::validation("token", "contains characters not allowed in an HTTP header")
    })?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Join a base URL and a resource path.
pub(crate) fn endpoint(base_url: &str, resource_path: &str) -> Result<Url> {
    let raw = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        resource_path.trim_start_matches('/')
    );
    Url::parse(&raw).map_err(|e| UpkeepError::validation("resource_path", format!("{raw}: {e}")))
}

/// Issue one authenticated GET and classify the answer.
pub(crate) async fn get_page(
    http: &Client,
    provider: Provider,
    url: Url,
    headers: &HeaderMap,
    timeout: Duration,
) -> Result<(HeaderMap, Value)> {
    tracing::debug!(provider = %provider, url = %url, "GET provider page");

    let response = http
        .get(url)
        .headers(headers.clone())
        .send()
        .await
        .map_err(|e| map_send_error(provider, timeout, &e))?;

    classify_response(provider, response).await
}

/// Split a `first/second` resource into its two non-empty parts.
pub(crate) fn split_pair<'a>(
    provider: Provider,
    resource: &'a str,
) -> Result<(&'a str, &'a str)> {
    let mut parts = resource.trim().trim_matches('/').split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty() => Ok((a, b)),
        _ => Err(UpkeepError::validation(
            "resource",
            format!(
                "{} resource must look like {}, got '{resource}'",
                provider.display_name(),
                provider.resource_hint()
            ),
        )),
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Provider clients keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.clients.keys().collect();
        providers.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &providers)
            .finish()
    }
}

impl ProviderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP clients for every provider, with optional base URL overrides.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be built.
    pub fn http(base_urls: &HashMap<Provider, String>, timeout: Duration) -> Result<Self> {
        let url_for = |p: Provider| {
            base_urls
                .get(&p)
                .cloned()
                .unwrap_or_else(|| p.default_base_url().to_string())
        };

        let mut registry = Self::new();
        registry.register(Arc::new(GithubClient::new(url_for(Provider::Github), timeout)?));
        registry.register(Arc::new(VercelClient::new(url_for(Provider::Vercel), timeout)?));
        registry.register(Arc::new(CloudflareClient::new(
            url_for(Provider::Cloudflare),
            timeout,
        )?));
        Ok(registry)
    }

    /// Add or replace the client for its provider.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.provider(), client);
    }

    /// Client for a provider.
    #[must_use]
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&provider).cloned()
    }
}
