//! Configuration file loading and resolution.
//!
//! Loads configuration from:
//! - Linux: `~/.config/upkeep/config.toml`
//! - macOS: `~/Library/Application Support/dev.upkeep.upkeep/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `UPKEEP_CONFIG`: Override config file path
//! - `UPKEEP_DB`: Database file path
//! - `UPKEEP_USER`: Acting user id
//! - `UPKEEP_TIMEOUT`: Per-call provider timeout in seconds
//!
//! ## Example
//!
//! ```toml
//! [general]
//! user = "alice"
//!
//! [sync]
//! timeout_seconds = 10
//! max_attempts = 3
//!
//! [providers.github]
//! base_url = "https://github.example.com/api/v3"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::core::provider::Provider;
use crate::core::retry::RetryPolicy;
use crate::error::{Result, UpkeepError};
use crate::providers::PageOptions;

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "UPKEEP_CONFIG";
/// Environment variable for the database path.
pub const ENV_DB: &str = "UPKEEP_DB";
/// Environment variable for the acting user.
pub const ENV_USER: &str = "UPKEEP_USER";
/// Environment variable for the provider call timeout in seconds.
pub const ENV_TIMEOUT: &str = "UPKEEP_TIMEOUT";

const MAX_TIMEOUT_SECONDS: u64 = 300;

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub user: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Acting user; commands that need one fail without it.
    pub user: Option<String>,
    pub database: PathBuf,
    /// Per-call provider timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub pages: PageOptions,
    /// Base URL overrides by provider.
    pub base_urls: HashMap<Provider, String>,
    pub log_level: Option<String>,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub user: ConfigSource,
    pub database: ConfigSource,
    pub timeout: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve against the process environment.
    ///
    /// # Errors
    /// Returns an error if the config file exists but is invalid, or a
    /// resolved value is out of range.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    ///
    /// # Errors
    /// Returns an error if the config file exists but is invalid, or a
    /// resolved value is out of range.
    pub fn resolve_with<F>(overrides: &ConfigOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = overrides
            .config
            .clone()
            .or_else(|| env(ENV_CONFIG).map(PathBuf::from))
            .unwrap_or_else(Config::config_path);
        let config = Config::load_from(&config_path)?;
        config.validate()?;

        let mut sources = ConfigSources::default();

        let user = Self::resolve_user(overrides, &env, &config, &mut sources.user);
        let database = Self::resolve_database(overrides, &env, &config, &mut sources.database);
        let timeout = Self::resolve_timeout(overrides, &env, &config, &mut sources.timeout)?;

        let retry = config.sync.retry_policy();
        retry.validate()?;

        Ok(Self {
            user,
            database,
            timeout,
            retry,
            pages: PageOptions {
                max_pages: config.sync.max_pages,
                per_page: config.sync.per_page,
            },
            base_urls: config.base_urls()?,
            log_level: config.general.log_level.clone(),
            sources,
        })
    }

    /// The acting user, or a validation error naming how to set one.
    ///
    /// # Errors
    /// Returns a validation error when no user was configured.
    pub fn require_user(&self) -> Result<&str> {
        self.user.as_deref().ok_or_else(|| {
            UpkeepError::validation(
                "user",
                format!("no user given; pass --user, set {ENV_USER}, or set general.user"),
            )
        })
    }

    fn resolve_user<F>(
        overrides: &ConfigOverrides,
        env: &F,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = overrides.user.clone() {
            *source = ConfigSource::Cli;
            return Some(user);
        }
        if let Some(user) = env(ENV_USER).filter(|u| !u.trim().is_empty()) {
            *source = ConfigSource::Env;
            return Some(user);
        }
        if let Some(user) = config.general.user.clone() {
            *source = ConfigSource::ConfigFile;
            return Some(user);
        }
        None
    }

    fn resolve_database<F>(
        overrides: &ConfigOverrides,
        env: &F,
        config: &Config,
        source: &mut ConfigSource,
    ) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = overrides.database.clone() {
            *source = ConfigSource::Cli;
            return path;
        }
        if let Some(path) = env(ENV_DB).filter(|p| !p.trim().is_empty()) {
            *source = ConfigSource::Env;
            return PathBuf::from(path);
        }
        if let Some(path) = config.general.database.clone() {
            *source = ConfigSource::ConfigFile;
            return path;
        }
        AppPaths::new().database_file()
    }

    fn resolve_timeout<F>(
        overrides: &ConfigOverrides,
        env: &F,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Result<Duration>
    where
        F: Fn(&str) -> Option<String>,
    {
        let seconds = if let Some(seconds) = overrides.timeout_seconds {
            *source = ConfigSource::Cli;
            seconds
        } else if let Some(seconds) = env(ENV_TIMEOUT).and_then(|v| v.trim().parse::<u64>().ok())
        {
            *source = ConfigSource::Env;
            seconds
        } else {
            *source = ConfigSource::ConfigFile;
            config.sync.timeout_seconds
        };

        validate_timeout(seconds)?;
        Ok(Duration::from_secs(seconds))
    }
}

fn validate_timeout(seconds: u64) -> Result<()> {
    if seconds == 0 || seconds > MAX_TIMEOUT_SECONDS {
        return Err(UpkeepError::ConfigInvalid {
            key: "sync.timeout_seconds".to_string(),
            message: format!("must be between 1 and {MAX_TIMEOUT_SECONDS} seconds"),
        });
    }
    Ok(())
}

// =============================================================================
// Config File
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub sync: SyncConfig,
    /// Per-provider settings keyed by provider slug.
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default acting user.
    pub user: Option<String>,
    /// Database file path.
    pub database: Option<PathBuf>,
    /// Default log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

/// Sync tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: u32,
    pub max_delay_ms: u64,
    pub max_pages: usize,
    pub per_page: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let pages = PageOptions::default();
        Self {
            timeout_seconds: crate::core::http::DEFAULT_TIMEOUT.as_secs(),
            max_attempts: retry.max_attempts,
            base_delay_ms: u64::try_from(retry.base_delay.as_millis()).unwrap_or(u64::MAX),
            backoff_factor: retry.factor,
            max_delay_ms: u64::try_from(retry.max_delay.as_millis()).unwrap_or(u64::MAX),
            max_pages: pages.max_pages,
            per_page: pages.per_page,
        }
    }
}

impl SyncConfig {
    /// Retry policy described by this section.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Settings for a specific provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Custom API base URL (self-hosted or enterprise endpoints).
    pub base_url: Option<String>,
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error only if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| UpkeepError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the file written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| UpkeepError::ConfigInvalid {
            key: "config".to_string(),
            message: format!("failed to serialize: {e}"),
        })?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        validate_timeout(self.sync.timeout_seconds)?;
        self.sync.retry_policy().validate()?;

        if self.sync.max_pages == 0 {
            return Err(UpkeepError::ConfigInvalid {
                key: "sync.max_pages".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.sync.per_page == 0 || self.sync.per_page > 100 {
            return Err(UpkeepError::ConfigInvalid {
                key: "sync.per_page".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }

        self.base_urls().map(|_| ())
    }

    /// Base URL overrides keyed by provider.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` for unknown provider sections or unparsable URLs.
    pub fn base_urls(&self) -> Result<HashMap<Provider, String>> {
        let mut urls = HashMap::new();
        for (slug, settings) in &self.providers {
            let provider = Provider::from_slug(slug).map_err(|_| UpkeepError::ConfigInvalid {
                key: format!("providers.{slug}"),
                message: format!(
                    "unknown provider; valid providers: {}",
                    Provider::ALL.iter().map(|p| p.slug()).collect::<Vec<_>>().join(", ")
                ),
            })?;

            if let Some(base_url) = &settings.base_url {
                reqwest::Url::parse(base_url).map_err(|e| UpkeepError::ConfigInvalid {
                    key: format!("providers.{slug}.base_url"),
                    message: e.to_string(),
                })?;
                urls.insert(provider, base_url.clone());
            }
        }
        Ok(urls)
    }
}
