//! Storage for configuration, credentials, and tracked state.

pub mod config;
pub mod credentials;
pub mod paths;
pub mod schema;
pub mod store;

pub use config::{
    Config, ConfigOverrides, ConfigSource, ConfigSources, ENV_CONFIG, ENV_DB, ENV_TIMEOUT,
    ENV_USER, ResolvedConfig,
};
pub use credentials::{CredentialStore, SqliteCredentialStore};
pub use paths::AppPaths;
pub use schema::{LATEST_VERSION, run_migrations};
pub use store::Store;
