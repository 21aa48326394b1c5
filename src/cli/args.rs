//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::storage::ConfigOverrides;

/// Upkeep - track cloud applications, sync provider deployments, and log
/// maintenance runs.
#[derive(Parser, Debug)]
#[command(name = "upkeep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Acting user id
    #[arg(long, value_name = "USER_ID", global = true)]
    pub user: Option<String>,

    /// Database file
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Config file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Provider call timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }

    /// Config values given on the command line.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config: self.config.clone(),
            database: self.db.clone(),
            user: self.user.clone(),
            timeout_seconds: self.timeout,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage provider credentials
    #[command(subcommand)]
    Credentials(CredentialsCommand),

    /// Manage tracked applications
    #[command(subcommand)]
    Apps(AppsCommand),

    /// Refresh an application's deployments from its providers
    Sync {
        /// Application id
        app_id: i64,
    },

    /// Show stored deployments of an application
    Deployments {
        /// Application id
        app_id: i64,
    },

    /// Record and review maintenance runs
    #[command(subcommand)]
    Maintenance(MaintenanceCommand),
}

/// Credential subcommands.
#[derive(Subcommand, Debug)]
pub enum CredentialsCommand {
    /// Store (or replace) the token for a provider
    Set {
        /// Provider (github, vercel, cloudflare)
        provider: String,

        /// Access token
        #[arg(long, env = "UPKEEP_TOKEN", hide_env_values = true)]
        token: String,

        /// Team id (Vercel only)
        #[arg(long, value_name = "TEAM_ID")]
        team: Option<String>,
    },

    /// Disconnect a provider
    Remove {
        /// Provider (github, vercel, cloudflare)
        provider: String,
    },

    /// List connected providers
    List,
}

/// Application subcommands.
#[derive(Subcommand, Debug)]
pub enum AppsCommand {
    /// Add an application
    Add {
        /// Application name
        name: String,

        /// Primary hosting provider
        #[arg(long)]
        provider: String,

        /// Public URL
        #[arg(long)]
        url: Option<String>,

        /// Tag (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },

    /// Attach a provider resource to an application
    Bind {
        /// Application id
        app_id: i64,

        /// Provider (github, vercel, cloudflare)
        provider: String,

        /// Resource: owner/repo, project id, or account_id/project
        resource: String,
    },

    /// List applications
    List,

    /// Show one application and its bindings
    Show {
        /// Application id
        app_id: i64,
    },

    /// Delete an application with its deployments and maintenance history
    Remove {
        /// Application id
        app_id: i64,
    },
}

/// Maintenance subcommands.
#[derive(Subcommand, Debug)]
pub enum MaintenanceCommand {
    /// Record a maintenance run
    Record {
        /// Application id
        app_id: i64,

        /// Command type id or name (see `upkeep maintenance commands`)
        #[arg(long)]
        command: String,

        /// Run status (pending, running, completed, failed, skipped)
        #[arg(long)]
        status: String,

        /// Results as a JSON object
        #[arg(long, value_name = "JSON")]
        results: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// When the run happened (RFC 3339); defaults to now
        #[arg(long, value_name = "TIMESTAMP")]
        run_at: Option<String>,
    },

    /// Update a pending or running maintenance run
    Update {
        /// Run id
        run_id: i64,

        /// New status
        #[arg(long)]
        status: Option<String>,

        /// Results as a JSON object
        #[arg(long, value_name = "JSON")]
        results: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show an application's run history, newest first
    History {
        /// Application id
        app_id: i64,
    },

    /// Show an application's maintenance checklist
    Checklist {
        /// Application id
        app_id: i64,
    },

    /// List maintenance command types
    Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text
    #[default]
    Human,
    /// JSON envelope
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_overrides_format() {
        let cli = Cli::parse_from(["upkeep", "--json", "apps", "list"]);
        assert_eq!(cli.effective_format(), OutputFormat::Json);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["upkeep", "sync", "4", "--user", "alice", "--db", "/tmp/x.db"]);
        assert!(matches!(cli.command, Commands::Sync { app_id: 4 }));
        let overrides = cli.overrides();
        assert_eq!(overrides.user.as_deref(), Some("alice"));
        assert_eq!(overrides.database, Some(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn repeated_tags() {
        let cli = Cli::parse_from([
            "upkeep", "apps", "add", "shop", "--provider", "vercel", "--tag", "prod", "--tag", "eu",
        ]);
        match cli.command {
            Commands::Apps(AppsCommand::Add { tags, .. }) => assert_eq!(tags, vec!["prod", "eu"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
