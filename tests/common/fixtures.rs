//! Engine builders and canned provider responses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use upkeep::core::{
    Application, BindProviderRequest, CreateApplicationRequest, RetryPolicy,
    SaveCredentialRequest, SyncSettings, Upkeep,
};
use upkeep::core::provider::Provider;
use upkeep::providers::{PageOptions, ProviderRegistry};
use upkeep::storage::Store;

pub const USER: &str = "user-1";

/// Sync tuning for tests: no backoff waits, short call bound.
pub fn fast_settings(max_attempts: u32) -> SyncSettings {
    SyncSettings {
        retry: RetryPolicy::immediate(max_attempts),
        pages: PageOptions::default(),
        call_timeout: Duration::from_secs(5),
    }
}

/// An engine over an in-memory store whose providers all point at `base_url`.
pub fn engine(base_url: &str, settings: SyncSettings) -> Upkeep {
    let base_urls: HashMap<Provider, String> = Provider::ALL
        .iter()
        .map(|&p| (p, base_url.to_string()))
        .collect();
    let registry = ProviderRegistry::http(&base_urls, settings.call_timeout).unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    Upkeep::new(store, registry, settings)
}

pub fn connect(upkeep: &Upkeep, provider: &str, token: &str, team_id: Option<&str>) {
    upkeep
        .save_credential(SaveCredentialRequest {
            user_id: USER.to_string(),
            provider: provider.to_string(),
            token: token.to_string(),
            team_id: team_id.map(String::from),
        })
        .unwrap();
}

pub fn add_app(upkeep: &Upkeep, name: &str, provider: &str) -> Application {
    upkeep
        .create_application(CreateApplicationRequest {
            user_id: USER.to_string(),
            name: name.to_string(),
            url: None,
            provider: provider.to_string(),
            tags: vec![],
        })
        .unwrap()
}

pub fn bind(upkeep: &Upkeep, app: &Application, provider: &str, resource: &str) {
    upkeep
        .bind_provider(BindProviderRequest {
            application_id: app.id,
            provider: provider.to_string(),
            resource: resource.to_string(),
        })
        .unwrap();
}

// =============================================================================
// Provider bodies
// =============================================================================

/// GitHub workflow runs page.
pub fn github_runs(ids: &[u64]) -> Value {
    let runs: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "status": "completed",
                "conclusion": "success",
                "head_sha": format!("sha{id:04}"),
                "html_url": format!("https://github.com/acme/web/actions/runs/{id}"),
                "created_at": "2026-05-01T12:00:00Z"
            })
        })
        .collect();
    json!({ "total_count": runs.len(), "workflow_runs": runs })
}

/// Vercel deployments page with an optional `until` cursor for the next page.
pub fn vercel_deployments(uids: &[&str], next: Option<i64>) -> Value {
    let deployments: Vec<Value> = uids
        .iter()
        .map(|uid| {
            json!({
                "uid": uid,
                "url": format!("{uid}.vercel.app"),
                "state": "READY",
                "createdAt": 1_777_636_800_000_i64
            })
        })
        .collect();
    json!({ "deployments": deployments, "pagination": { "next": next } })
}

/// Cloudflare Pages deployments page.
pub fn cloudflare_deployments(ids: &[&str], page: u32, total_pages: u32) -> Value {
    let result: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "url": format!("https://{id}.site.pages.dev"),
                "created_on": "2026-05-01T12:00:00Z",
                "latest_stage": { "name": "deploy", "status": "success" }
            })
        })
        .collect();
    json!({
        "success": true,
        "errors": [],
        "result": result,
        "result_info": { "page": page, "total_pages": total_pages }
    })
}
