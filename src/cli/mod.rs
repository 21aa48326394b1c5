//! CLI argument parsing and command dispatch.

pub mod apps;
pub mod args;
pub mod credentials;
pub mod maintenance;
pub mod sync;

pub use args::{Cli, Commands, OutputFormat};

use crate::core::Upkeep;
use crate::error::{Result, UpkeepError};

/// Everything a command handler needs.
#[derive(Debug)]
pub struct Context {
    pub upkeep: Upkeep,
    pub user: Option<String>,
    pub format: OutputFormat,
    pub pretty: bool,
}

impl Context {
    /// The acting user, for commands scoped to one.
    ///
    /// # Errors
    /// Returns a validation error when no user was configured.
    pub fn user(&self) -> Result<&str> {
        self.user.as_deref().ok_or_else(|| {
            UpkeepError::validation(
                "user",
                "no user given; pass --user, set UPKEEP_USER, or set general.user",
            )
        })
    }
}

/// Run a parsed command and return its rendered output.
///
/// # Errors
/// Returns the command's error unchanged.
pub async fn dispatch(command: &Commands, ctx: &Context) -> Result<String> {
    match command {
        Commands::Credentials(cmd) => credentials::execute(cmd, ctx),
        Commands::Apps(cmd) => apps::execute(cmd, ctx),
        Commands::Sync { app_id } => sync::execute_sync(*app_id, ctx).await,
        Commands::Deployments { app_id } => sync::execute_deployments(*app_id, ctx),
        Commands::Maintenance(cmd) => maintenance::execute(cmd, ctx),
    }
}
