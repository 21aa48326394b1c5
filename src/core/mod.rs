//! Core data models, sync, and maintenance logic.

pub mod engine;
pub mod fingerprint;
pub mod http;
pub mod logging;
pub mod maintenance;
pub mod models;
pub mod normalize;
pub mod provider;
pub mod retry;
pub mod sync;

pub use engine::{BindProviderRequest, CreateApplicationRequest, SaveCredentialRequest, Upkeep};
pub use maintenance::{CreateRunRequest, MaintenanceEngine, UpdateRunRequest};
pub use models::{
    Application, ChecklistEntry, Deployment, DeploymentStatus, MaintenanceCommandType,
    MaintenanceRun, MaintenanceStatusItem, ProviderBinding, ProviderCredential, ProviderOutcome,
    RawPayload, RunStatus, SyncResult, SyncStatus,
};
pub use provider::Provider;
pub use retry::RetryPolicy;
pub use sync::{SyncCoordinator, SyncSettings};
