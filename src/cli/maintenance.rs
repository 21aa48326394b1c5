//! `upkeep maintenance` subcommands.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Context;
use crate::cli::args::MaintenanceCommand;
use crate::core::{CreateRunRequest, UpdateRunRequest};
use crate::error::{Result, UpkeepError};
use crate::render::{human, render};

/// Execute maintenance commands.
///
/// # Errors
/// Returns an error when input is rejected, an id is unknown, or a run
/// cannot make the requested transition.
pub fn execute(cmd: &MaintenanceCommand, ctx: &Context) -> Result<String> {
    match cmd {
        MaintenanceCommand::Record {
            app_id,
            command,
            status,
            results,
            notes,
            run_at,
        } => {
            let run = ctx.upkeep.create_maintenance_run(CreateRunRequest {
                application_id: *app_id,
                command_type_id: resolve_command(ctx, command)?,
                status: status.clone(),
                results: parse_results(results.as_deref())?,
                notes: notes.clone(),
                run_at: run_at.as_deref().map(parse_run_at).transpose()?,
            })?;
            render("maintenance record", &run, ctx.format, ctx.pretty, human::render_run)
        }
        MaintenanceCommand::Update {
            run_id,
            status,
            results,
            notes,
        } => {
            let run = ctx.upkeep.update_maintenance_run(UpdateRunRequest {
                run_id: *run_id,
                status: status.clone(),
                results: parse_results(results.as_deref())?,
                notes: notes.clone(),
            })?;
            render("maintenance update", &run, ctx.format, ctx.pretty, human::render_run)
        }
        MaintenanceCommand::History { app_id } => {
            let runs = ctx.upkeep.history(*app_id)?;
            render("maintenance history", &runs, ctx.format, ctx.pretty, |r| {
                human::render_history(r)
            })
        }
        MaintenanceCommand::Checklist { app_id } => {
            let entries = ctx.upkeep.checklist(*app_id)?;
            render("maintenance checklist", &entries, ctx.format, ctx.pretty, |e| {
                human::render_checklist(e)
            })
        }
        MaintenanceCommand::Commands => {
            let types = ctx.upkeep.command_types()?;
            render("maintenance commands", &types, ctx.format, ctx.pretty, |t| {
                human::render_command_types(t)
            })
        }
    }
}

/// Accept a numeric id or a catalog name such as `backup-check`.
fn resolve_command(ctx: &Context, value: &str) -> Result<i64> {
    if let Ok(id) = value.trim().parse::<i64>() {
        return Ok(id);
    }
    let wanted = value.trim().to_lowercase();
    ctx.upkeep
        .command_types()?
        .into_iter()
        .find(|t| t.name == wanted)
        .map(|t| t.id)
        .ok_or_else(|| UpkeepError::not_found("maintenance command", value))
}

fn parse_results(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|s| {
        serde_json::from_str::<Value>(s)
            .map_err(|e| UpkeepError::validation("results", format!("invalid JSON: {e}")))
    })
    .transpose()
}

fn parse_run_at(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| UpkeepError::validation("run_at", format!("'{raw}': {e}")))
}
