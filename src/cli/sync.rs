//! `upkeep sync` and `upkeep deployments`.

use super::Context;
use crate::error::Result;
use crate::render::{human, render};

/// Sync one application and report per-provider outcomes.
///
/// Provider failures are part of the result, not an error.
///
/// # Errors
/// Returns an error for an unknown application.
pub async fn execute_sync(app_id: i64, ctx: &Context) -> Result<String> {
    let result = ctx.upkeep.sync_application(app_id).await?;
    if result.failed_count() > 0 {
        tracing::warn!(
            application_id = app_id,
            failed = result.failed_count(),
            "Sync finished with provider failures"
        );
    }
    render("sync", &result, ctx.format, ctx.pretty, human::render_sync)
}

/// List stored deployments, newest first.
///
/// # Errors
/// Returns an error for an unknown application.
pub fn execute_deployments(app_id: i64, ctx: &Context) -> Result<String> {
    let deployments = ctx.upkeep.deployments(app_id)?;
    render("deployments", &deployments, ctx.format, ctx.pretty, |d| {
        human::render_deployments(d)
    })
}
