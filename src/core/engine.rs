//! Command surface.
//!
//! [`Upkeep`] wires the store, credential store, provider clients, sync
//! coordinator and maintenance engine together. Requests carry raw strings
//! for enum fields; everything is validated before any state changes.

use std::sync::Arc;

use super::maintenance::{CreateRunRequest, MaintenanceEngine, UpdateRunRequest};
use super::models::{
    Application, ChecklistEntry, Deployment, MaintenanceCommandType, MaintenanceRun,
    NewApplication, ProviderBinding, ProviderCredential, SyncResult,
};
use super::provider::Provider;
use super::sync::{SyncCoordinator, SyncSettings};
use crate::error::{Result, UpkeepError};
use crate::providers::ProviderRegistry;
use crate::storage::{CredentialStore, ResolvedConfig, SqliteCredentialStore, Store};

/// Input for connecting a provider.
#[derive(Debug, Clone, Default)]
pub struct SaveCredentialRequest {
    pub user_id: String,
    pub provider: String,
    pub token: String,
    pub team_id: Option<String>,
}

/// Input for adding an application.
#[derive(Debug, Clone, Default)]
pub struct CreateApplicationRequest {
    pub user_id: String,
    pub name: String,
    pub url: Option<String>,
    pub provider: String,
    pub tags: Vec<String>,
}

/// Input for attaching a provider resource to an application.
#[derive(Debug, Clone, Default)]
pub struct BindProviderRequest {
    pub application_id: i64,
    pub provider: String,
    pub resource: String,
}

fn non_empty(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(UpkeepError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn validate_url(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url.trim())
        .map_err(|e| UpkeepError::validation("url", format!("'{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UpkeepError::validation("url", "must be an http or https URL"));
    }
    Ok(parsed.to_string())
}

/// The engine behind every command.
#[derive(Debug, Clone)]
pub struct Upkeep {
    store: Arc<Store>,
    credentials: Arc<SqliteCredentialStore>,
    registry: ProviderRegistry,
    sync: SyncCoordinator,
    maintenance: MaintenanceEngine,
}

impl Upkeep {
    /// Assemble from an open store, provider clients and sync tuning.
    #[must_use]
    pub fn new(store: Arc<Store>, registry: ProviderRegistry, settings: SyncSettings) -> Self {
        let credentials = Arc::new(SqliteCredentialStore::new(Arc::clone(&store)));
        let sync = SyncCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            registry.clone(),
            settings,
        );
        let maintenance = MaintenanceEngine::new(Arc::clone(&store));
        Self {
            store,
            credentials,
            registry,
            sync,
            maintenance,
        }
    }

    /// Open the configured database with HTTP provider clients.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated, or an
    /// HTTP client cannot be built.
    pub fn open(config: &ResolvedConfig) -> Result<Self> {
        let store = Arc::new(Store::open(&config.database)?);
        let registry = ProviderRegistry::http(&config.base_urls, config.timeout)?;
        let settings = SyncSettings {
            retry: config.retry,
            pages: config.pages,
            call_timeout: config.timeout,
        };
        Ok(Self::new(store, registry, settings))
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// The stored token for (user, provider), if any.
    ///
    /// # Errors
    /// `Validation` for an unknown provider slug, or a storage error.
    pub fn get_token(&self, user_id: &str, provider: &str) -> Result<Option<String>> {
        let provider = Provider::from_slug(provider)?;
        self.credentials.get_token(user_id, provider)
    }

    /// Connect (or reconnect) a provider for a user.
    ///
    /// # Errors
    /// `Validation` for an unknown provider, empty token, or a team id on a
    /// provider without teams.
    pub fn save_credential(&self, request: SaveCredentialRequest) -> Result<Provider> {
        let provider = Provider::from_slug(&request.provider)?;
        let user_id = non_empty("user_id", &request.user_id)?;
        let token = non_empty("token", &request.token)?;

        let team_id = match request.team_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(team) if provider.supports_team() => Some(team.to_string()),
            Some(_) => {
                return Err(UpkeepError::validation(
                    "team_id",
                    format!("{} credentials do not take a team id", provider.display_name()),
                ));
            }
        };

        self.credentials.save(&ProviderCredential {
            user_id,
            provider,
            token,
            team_id,
        })?;
        Ok(provider)
    }

    /// Disconnect a provider. Returns whether a credential existed.
    ///
    /// # Errors
    /// `Validation` for an unknown provider slug, or a storage error.
    pub fn remove_credential(&self, user_id: &str, provider: &str) -> Result<bool> {
        let provider = Provider::from_slug(provider)?;
        self.credentials.remove(user_id, provider)
    }

    /// Providers the user has connected.
    ///
    /// # Errors
    /// Returns an error if the store query fails.
    pub fn connected_providers(&self, user_id: &str) -> Result<Vec<Provider>> {
        self.credentials.connected_providers(user_id)
    }

    // =========================================================================
    // Applications
    // =========================================================================

    /// Add an application.
    ///
    /// # Errors
    /// `Validation` for malformed input or a duplicate name.
    pub fn create_application(&self, request: CreateApplicationRequest) -> Result<Application> {
        let provider = Provider::from_slug(&request.provider)?;
        let user_id = non_empty("user_id", &request.user_id)?;
        let name = non_empty("name", &request.name)?;
        let url = request
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .map(validate_url)
            .transpose()?;

        let mut tags: Vec<String> = request
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();

        let app = self.store.create_application(&NewApplication {
            user_id,
            name,
            url,
            provider,
            tags,
        })?;
        tracing::info!(application_id = app.id, name = %app.name, "Created application");
        Ok(app)
    }

    /// Attach a provider resource to an application.
    ///
    /// # Errors
    /// `Validation` for an unknown provider or malformed resource, `NotFound`
    /// for an unknown application.
    pub fn bind_provider(&self, request: BindProviderRequest) -> Result<ProviderBinding> {
        let provider = Provider::from_slug(&request.provider)?;
        let resource = non_empty("resource", &request.resource)?;
        self.application(request.application_id)?;

        let binding = ProviderBinding {
            application_id: request.application_id,
            provider,
            resource,
        };
        if let Some(client) = self.registry.get(provider) {
            client.deployments_path(&binding)?;
        }

        self.store.bind_provider(&binding)?;
        tracing::info!(
            application_id = binding.application_id,
            provider = %provider,
            "Bound provider resource"
        );
        Ok(binding)
    }

    /// One application.
    ///
    /// # Errors
    /// `NotFound` for an unknown application.
    pub fn application(&self, application_id: i64) -> Result<Application> {
        self.store
            .get_application(application_id)?
            .ok_or_else(|| UpkeepError::not_found("application", application_id))
    }

    /// Applications owned by a user.
    ///
    /// # Errors
    /// Returns an error if the store query fails.
    pub fn list_applications(&self, user_id: &str) -> Result<Vec<Application>> {
        self.store.list_applications(user_id)
    }

    /// Provider bindings of an application.
    ///
    /// # Errors
    /// `NotFound` for an unknown application.
    pub fn bindings(&self, application_id: i64) -> Result<Vec<ProviderBinding>> {
        self.application(application_id)?;
        self.store.bindings(application_id)
    }

    /// Delete an application and everything attached to it, cancelling any
    /// sync in flight.
    ///
    /// # Errors
    /// `NotFound` for an unknown application.
    pub fn delete_application(&self, application_id: i64) -> Result<()> {
        self.sync.cancel(application_id);
        if !self.store.delete_application(application_id)? {
            return Err(UpkeepError::not_found("application", application_id));
        }
        tracing::info!(application_id, "Deleted application");
        Ok(())
    }

    // =========================================================================
    // Sync and deployments
    // =========================================================================

    /// Refresh an application from its providers.
    ///
    /// # Errors
    /// `NotFound` for an unknown application; provider failures are reported
    /// in the result.
    pub async fn sync_application(&self, application_id: i64) -> Result<SyncResult> {
        self.sync.sync_application(application_id).await
    }

    /// The coordinator, for callers that need `cancel` or in-flight checks.
    #[must_use]
    pub const fn sync_coordinator(&self) -> &SyncCoordinator {
        &self.sync
    }

    /// Stored deployments of an application, newest first.
    ///
    /// # Errors
    /// `NotFound` for an unknown application.
    pub fn deployments(&self, application_id: i64) -> Result<Vec<Deployment>> {
        self.application(application_id)?;
        self.store.deployments(application_id)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Record a maintenance run.
    ///
    /// # Errors
    /// See [`MaintenanceEngine::create_run`].
    pub fn create_maintenance_run(&self, request: CreateRunRequest) -> Result<MaintenanceRun> {
        self.maintenance.create_run(request)
    }

    /// Update a maintenance run.
    ///
    /// # Errors
    /// See [`MaintenanceEngine::update_run`].
    pub fn update_maintenance_run(&self, request: UpdateRunRequest) -> Result<MaintenanceRun> {
        self.maintenance.update_run(request)
    }

    /// Checklist of an application.
    ///
    /// # Errors
    /// `NotFound` for an unknown application.
    pub fn checklist(&self, application_id: i64) -> Result<Vec<ChecklistEntry>> {
        self.maintenance.checklist(application_id)
    }

    /// Maintenance history of an application.
    ///
    /// # Errors
    /// `NotFound` for an unknown application.
    pub fn history(&self, application_id: i64) -> Result<Vec<MaintenanceRun>> {
        self.maintenance.history(application_id)
    }

    /// The maintenance command catalog.
    ///
    /// # Errors
    /// Returns an error if the store query fails.
    pub fn command_types(&self) -> Result<Vec<MaintenanceCommandType>> {
        self.maintenance.command_types()
    }

    /// The maintenance engine.
    #[must_use]
    pub const fn maintenance(&self) -> &MaintenanceEngine {
        &self.maintenance
    }
}
