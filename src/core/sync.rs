//! Application sync.
//!
//! Refreshes one application's deployments from every provider it is bound
//! to. Providers are fetched concurrently and fail independently; the result
//! reports each provider's outcome.
//!
//! At most one sync per application runs at a time. Callers arriving while
//! one is in flight attach to it and receive the same [`SyncResult`]. Calls
//! for the same (user, provider) pair are serialized across applications.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::fingerprint::token_fingerprint;
use super::http::DEFAULT_TIMEOUT;
use super::models::{
    Application, DETAIL_CANCELLED, DETAIL_NO_CREDENTIAL, ProviderBinding, ProviderCredential,
    ProviderOutcome, RawPayload, SyncResult,
};
use super::normalize::normalize;
use super::provider::Provider;
use super::retry::RetryPolicy;
use crate::error::{Result, UpkeepError};
use crate::providers::{PageOptions, ProviderClient, ProviderRegistry};
use crate::storage::store::now;
use crate::storage::{CredentialStore, Store};

/// Tuning for provider calls made during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub retry: RetryPolicy,
    pub pages: PageOptions,
    /// Bound on one `fetch_resource` call, pagination included.
    pub call_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            pages: PageOptions::default(),
            call_timeout: DEFAULT_TIMEOUT,
        }
    }
}

type SharedSync = Shared<BoxFuture<'static, std::result::Result<SyncResult, String>>>;

struct InFlight {
    future: SharedSync,
    cancel: CancellationToken,
}

type GateKey = (String, Provider);

struct Inner {
    store: Arc<Store>,
    credentials: Arc<dyn CredentialStore>,
    registry: ProviderRegistry,
    settings: SyncSettings,
    in_flight: Mutex<HashMap<i64, InFlight>>,
    gates: Mutex<HashMap<GateKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Coordinates provider refreshes for applications.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("registry", &self.inner.registry)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// Drops the in-flight entry when the sync task ends, however it ends.
struct InFlightGuard {
    inner: Arc<Inner>,
    application_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.inner.in_flight.lock() {
            in_flight.remove(&self.application_id);
        }
    }
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        credentials: Arc<dyn CredentialStore>,
        registry: ProviderRegistry,
        settings: SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                credentials,
                registry,
                settings,
                in_flight: Mutex::new(HashMap::new()),
                gates: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Refresh an application from all of its bound providers.
    ///
    /// Per-provider failures are reported in the result, never returned.
    ///
    /// # Errors
    /// `NotFound` for an unknown application, or a storage error while
    /// loading it.
    pub async fn sync_application(&self, application_id: i64) -> Result<SyncResult> {
        let application = self
            .inner
            .store
            .get_application(application_id)?
            .ok_or_else(|| UpkeepError::not_found("application", application_id))?;
        let bindings = self.inner.store.bindings(application_id)?;

        let future = {
            let mut in_flight = self.lock_in_flight()?;
            if let Some(existing) = in_flight.get(&application_id) {
                tracing::debug!(application_id, "Attaching to in-flight sync");
                existing.future.clone()
            } else {
                let cancel = CancellationToken::new();
                let future = self.spawn_sync(application, bindings, cancel.clone());
                in_flight.insert(
                    application_id,
                    InFlight {
                        future: future.clone(),
                        cancel,
                    },
                );
                future
            }
        };

        future
            .await
            .map_err(|e| UpkeepError::Other(anyhow::anyhow!("sync task failed: {e}")))
    }

    /// Stop an in-flight sync. Returns whether one was running.
    ///
    /// No further attempts are scheduled. Calls in the air, backoff waits
    /// and waits on a provider gate are abandoned and nothing is persisted.
    pub fn cancel(&self, application_id: i64) -> bool {
        let Ok(in_flight) = self.inner.in_flight.lock() else {
            return false;
        };
        match in_flight.get(&application_id) {
            Some(entry) => {
                entry.cancel.cancel();
                tracing::info!(application_id, "Cancelling in-flight sync");
                true
            }
            None => false,
        }
    }

    /// Whether a sync for the application is running.
    #[must_use]
    pub fn is_in_flight(&self, application_id: i64) -> bool {
        self.inner
            .in_flight
            .lock()
            .is_ok_and(|m| m.contains_key(&application_id))
    }

    fn lock_in_flight(&self) -> Result<std::sync::MutexGuard<'_, HashMap<i64, InFlight>>> {
        self.inner
            .in_flight
            .lock()
            .map_err(|_| UpkeepError::Other(anyhow::anyhow!("in-flight map poisoned")))
    }

    fn spawn_sync(
        &self,
        application: Application,
        bindings: Vec<ProviderBinding>,
        cancel: CancellationToken,
    ) -> SharedSync {
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            application_id: application.id,
        };
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            let _guard = guard;
            inner.run(&application, bindings, &cancel).await
        });

        async move { handle.await.map_err(|e| e.to_string()) }
            .boxed()
            .shared()
    }
}

impl Inner {
    async fn run(
        &self,
        application: &Application,
        bindings: Vec<ProviderBinding>,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let started_at = now();
        tracing::info!(
            application_id = application.id,
            providers = bindings.len(),
            "Starting sync"
        );

        let outcomes = join_all(
            bindings
                .into_iter()
                .map(|binding| self.sync_provider(application, binding, cancel)),
        )
        .await;

        let providers: BTreeMap<Provider, ProviderOutcome> = outcomes.into_iter().collect();
        let result = SyncResult {
            application_id: application.id,
            started_at,
            finished_at: now(),
            providers,
        };

        tracing::info!(
            application_id = application.id,
            failed = result.failed_count(),
            "Sync finished"
        );
        result
    }

    async fn sync_provider(
        &self,
        application: &Application,
        binding: ProviderBinding,
        cancel: &CancellationToken,
    ) -> (Provider, ProviderOutcome) {
        let provider = binding.provider;
        let user_id = application.user_id.as_str();

        if cancel.is_cancelled() {
            return (provider, ProviderOutcome::skipped(DETAIL_CANCELLED, 0));
        }

        let credential = match self.credentials.get_credential(user_id, provider) {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                tracing::info!(user_id, provider = %provider, "No credential, skipping provider");
                return (provider, ProviderOutcome::skipped(DETAIL_NO_CREDENTIAL, 0));
            }
            Err(err) => return (provider, self.failed(application, provider, &err, 0)),
        };

        let Some(client) = self.registry.get(provider) else {
            let err = UpkeepError::ProviderUnavailable {
                provider: provider.slug().to_string(),
                message: "no client registered".to_string(),
            };
            return (provider, self.failed(application, provider, &err, 0));
        };

        let path = match client.deployments_path(&binding) {
            Ok(path) => path,
            Err(err) => return (provider, self.failed(application, provider, &err, 0)),
        };

        tracing::debug!(
            user_id,
            provider = %provider,
            fingerprint = %token_fingerprint(&credential.token),
            path = %path,
            "Fetching deployments"
        );

        let gate = self.gate(user_id, provider);
        let (fetched, attempts) = tokio::select! {
            biased;
            () = cancel.cancelled() => (None, 0),
            permit = gate.lock() => {
                let _permit = permit;
                self.fetch_with_retry(client.as_ref(), &credential, &path, cancel)
                    .await
            }
        };

        let Some(fetched) = fetched.filter(|_| !cancel.is_cancelled()) else {
            tracing::info!(
                application_id = application.id,
                provider = %provider,
                attempts,
                "Sync cancelled, discarding provider result"
            );
            return (provider, ProviderOutcome::skipped(DETAIL_CANCELLED, attempts));
        };

        let outcome = match fetched.and_then(|payload| self.persist(application.id, &payload)) {
            Ok((count, partial)) => {
                tracing::info!(
                    application_id = application.id,
                    provider = %provider,
                    deployments = count,
                    attempts,
                    partial,
                    "Provider synced"
                );
                ProviderOutcome::ok(count, attempts, partial)
            }
            Err(err) => self.failed(application, provider, &err, attempts),
        };
        (provider, outcome)
    }

    /// Call the provider until it succeeds, the error is final, or the
    /// retry budget runs out. `None` means the sync was cancelled first.
    async fn fetch_with_retry(
        &self,
        client: &dyn ProviderClient,
        credential: &ProviderCredential,
        path: &str,
        cancel: &CancellationToken,
    ) -> (Option<Result<RawPayload>>, u32) {
        let provider = client.provider();
        let policy = &self.settings.retry;
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return (None, attempts);
            }
            attempts += 1;
            let call = timeout(
                self.settings.call_timeout,
                client.fetch_resource(credential, path, &self.settings.pages),
            );
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return (None, attempts),
                result = call => match result {
                    Ok(result) => result,
                    Err(_) => Err(UpkeepError::Timeout {
                        provider: provider.slug().to_string(),
                        seconds: self.settings.call_timeout.as_secs(),
                    }),
                },
            };

            match result {
                Ok(payload) => return (Some(Ok(payload)), attempts),
                Err(err) if policy.should_retry(attempts, &err) => {
                    let delay = policy.delay_for(attempts, &err);
                    tracing::warn!(
                        provider = %provider,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Provider call failed, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return (None, attempts),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return (Some(Err(err)), attempts),
            }
        }
    }

    fn persist(&self, application_id: i64, payload: &RawPayload) -> Result<(usize, bool)> {
        let deployments = normalize(application_id, payload)?;
        let count = self.store.upsert_deployments(&deployments)?;
        Ok((count, payload.partial))
    }

    fn failed(
        &self,
        application: &Application,
        provider: Provider,
        err: &UpkeepError,
        attempts: u32,
    ) -> ProviderOutcome {
        tracing::warn!(
            application_id = application.id,
            provider = %provider,
            attempts,
            error_code = err.error_code(),
            error = %err,
            "Provider sync failed"
        );
        ProviderOutcome::failed(err, attempts)
    }

    fn gate(&self, user_id: &str, provider: Provider) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = match self.gates.lock() {
            Ok(gates) => gates,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            gates
                .entry((user_id.to_string(), provider))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{NewApplication, SyncStatus};
    use crate::storage::SqliteCredentialStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted client: fails `failures` times with the given error kind, then
    /// returns one GitHub page with a single run.
    struct ScriptedClient {
        calls: AtomicU32,
        failures: u32,
        delay: Duration,
        auth_error: bool,
    }

    impl ScriptedClient {
        fn new(failures: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                delay: Duration::ZERO,
                auth_error: false,
            }
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedClient {
        fn provider(&self) -> Provider {
            Provider::Github
        }

        fn deployments_path(&self, binding: &ProviderBinding) -> Result<String> {
            Ok(format!("/repos/{}/actions/runs", binding.resource))
        }

        async fn fetch_resource(
            &self,
            _credential: &ProviderCredential,
            _resource_path: &str,
            _pages: &PageOptions,
        ) -> Result<RawPayload> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.auth_error {
                return Err(UpkeepError::AuthInvalid {
                    provider: "github".to_string(),
                    status: 401,
                });
            }
            if call <= self.failures {
                return Err(UpkeepError::ProviderUnavailable {
                    provider: "github".to_string(),
                    message: "HTTP 503".to_string(),
                });
            }
            Ok(RawPayload {
                provider: Provider::Github,
                pages: vec![json!({"workflow_runs": [{
                    "id": 7,
                    "status": "completed",
                    "conclusion": "success",
                    "head_sha": "abc",
                    "created_at": "2026-01-02T03:04:05Z"
                }]})],
                partial: false,
            })
        }
    }

    struct Fixture {
        coordinator: SyncCoordinator,
        store: Arc<Store>,
        client: Arc<ScriptedClient>,
        app_id: i64,
    }

    fn fixture(client: ScriptedClient, with_credential: bool) -> Fixture {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let credentials = Arc::new(SqliteCredentialStore::new(Arc::clone(&store)));
        let app = store
            .create_application(&NewApplication {
                user_id: "u1".to_string(),
                name: "web".to_string(),
                url: None,
                provider: Provider::Github,
                tags: vec![],
            })
            .unwrap();
        store
            .bind_provider(&ProviderBinding {
                application_id: app.id,
                provider: Provider::Github,
                resource: "acme/web".to_string(),
            })
            .unwrap();
        if with_credential {
            credentials
                .save(&ProviderCredential {
                    user_id: "u1".to_string(),
                    provider: Provider::Github,
                    token: "ghp_test".to_string(),
                    team_id: None,
                })
                .unwrap();
        }

        let client = Arc::new(client);
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::clone(&client) as Arc<dyn ProviderClient>);

        let settings = SyncSettings {
            retry: RetryPolicy::immediate(3),
            ..SyncSettings::default()
        };
        Fixture {
            coordinator: SyncCoordinator::new(Arc::clone(&store), credentials, registry, settings),
            store,
            client,
            app_id: app.id,
        }
    }

    #[tokio::test]
    async fn unknown_application_is_not_found() {
        let f = fixture(ScriptedClient::new(0), true);
        let err = f.coordinator.sync_application(9999).await.unwrap_err();
        assert!(matches!(err, UpkeepError::NotFound { .. }));
    }

    #[tokio::test]
    async fn missing_credential_skips_without_calling() {
        let f = fixture(ScriptedClient::new(0), false);
        let result = f.coordinator.sync_application(f.app_id).await.unwrap();
        let outcome = result.outcome(Provider::Github).unwrap();
        assert_eq!(outcome.status, SyncStatus::Skipped);
        assert_eq!(outcome.detail, DETAIL_NO_CREDENTIAL);
        assert_eq!(f.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let f = fixture(ScriptedClient::new(2), true);
        let result = f.coordinator.sync_application(f.app_id).await.unwrap();
        let outcome = result.outcome(Provider::Github).unwrap();
        assert_eq!(outcome.status, SyncStatus::Ok);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(f.store.deployments(f.app_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_report_failure() {
        let f = fixture(ScriptedClient::new(10), true);
        let result = f.coordinator.sync_application(f.app_id).await.unwrap();
        let outcome = result.outcome(Provider::Github).unwrap();
        assert_eq!(outcome.status, SyncStatus::Failed);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(f.client.calls.load(Ordering::SeqCst), 3);
        assert!(f.store.deployments(f.app_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let mut client = ScriptedClient::new(0);
        client.auth_error = true;
        let f = fixture(client, true);
        let result = f.coordinator.sync_application(f.app_id).await.unwrap();
        let outcome = result.outcome(Provider::Github).unwrap();
        assert_eq!(outcome.status, SyncStatus::Failed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error_code.as_deref(), Some("UPK-A002"));
    }

    #[tokio::test]
    async fn concurrent_syncs_share_one_run() {
        let mut client = ScriptedClient::new(0);
        client.delay = Duration::from_millis(100);
        let f = fixture(client, true);

        let (a, b) = tokio::join!(
            f.coordinator.sync_application(f.app_id),
            f.coordinator.sync_application(f.app_id)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(f.client.calls.load(Ordering::SeqCst), 1);
        assert!(!f.coordinator.is_in_flight(f.app_id));
    }

    #[tokio::test]
    async fn cancel_discards_results() {
        let mut client = ScriptedClient::new(0);
        client.delay = Duration::from_millis(200);
        let f = fixture(client, true);

        let coordinator = f.coordinator.clone();
        let app_id = f.app_id;
        let task = tokio::spawn(async move { coordinator.sync_application(app_id).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.coordinator.cancel(f.app_id));

        let result = task.await.unwrap().unwrap();
        let outcome = result.outcome(Provider::Github).unwrap();
        assert_eq!(outcome.status, SyncStatus::Skipped);
        assert_eq!(outcome.detail, DETAIL_CANCELLED);
        assert!(f.store.deployments(f.app_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let mut client = ScriptedClient::new(0);
        client.delay = Duration::from_secs(5);
        let mut f = fixture(client, true);
        let settings = SyncSettings {
            retry: RetryPolicy::immediate(1),
            call_timeout: Duration::from_millis(50),
            ..SyncSettings::default()
        };
        f.coordinator = SyncCoordinator::new(
            Arc::clone(&f.store),
            Arc::clone(&f.coordinator.inner.credentials),
            f.coordinator.inner.registry.clone(),
            settings,
        );

        let result = f.coordinator.sync_application(f.app_id).await.unwrap();
        let outcome = result.outcome(Provider::Github).unwrap();
        assert_eq!(outcome.status, SyncStatus::Failed);
        assert_eq!(outcome.error_code.as_deref(), Some("UPK-N001"));
    }

    #[tokio::test]
    async fn cancel_during_backoff_stops_further_calls() {
        let mut f = fixture(ScriptedClient::new(10), true);
        let settings = SyncSettings {
            retry: RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(300),
                factor: 1,
                max_delay: Duration::from_millis(300),
            },
            ..SyncSettings::default()
        };
        f.coordinator = SyncCoordinator::new(
            Arc::clone(&f.store),
            Arc::clone(&f.coordinator.inner.credentials),
            f.coordinator.inner.registry.clone(),
            settings,
        );

        let coordinator = f.coordinator.clone();
        let app_id = f.app_id;
        let task = tokio::spawn(async move { coordinator.sync_application(app_id).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.client.calls.load(Ordering::SeqCst), 1);
        assert!(f.coordinator.cancel(f.app_id));

        let result = tokio::time::timeout(Duration::from_millis(200), task)
            .await
            .expect("cancel should cut the backoff short")
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(f.client.calls.load(Ordering::SeqCst), 1);
        let outcome = result.outcome(Provider::Github).unwrap();
        assert_eq!(outcome.status, SyncStatus::Skipped);
        assert_eq!(outcome.detail, DETAIL_CANCELLED);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn cancel_while_waiting_on_gate_makes_no_call() {
        let f = fixture(ScriptedClient::new(0), true);
        let gate = f.coordinator.inner.gate("u1", Provider::Github);
        let held = gate.lock().await;

        let coordinator = f.coordinator.clone();
        let app_id = f.app_id;
        let task = tokio::spawn(async move { coordinator.sync_application(app_id).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.coordinator.cancel(f.app_id));
        let result = task.await.unwrap().unwrap();
        drop(held);

        assert_eq!(f.client.calls.load(Ordering::SeqCst), 0);
        let outcome = result.outcome(Provider::Github).unwrap();
        assert_eq!(outcome.status, SyncStatus::Skipped);
        assert_eq!(outcome.attempts, 0);
    }

    #[test]
    fn cancel_without_sync_is_noop() {
        let f = fixture(ScriptedClient::new(0), true);
        assert!(!f.coordinator.cancel(f.app_id));
    }
}
