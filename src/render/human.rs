//! Plain-text output.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::core::models::{
    Application, ChecklistEntry, Deployment, MaintenanceCommandType, MaintenanceRun,
    ProviderBinding, SyncResult, SyncStatus,
};
use crate::core::provider::Provider;

fn short_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

fn short_sha(sha: Option<&str>) -> &str {
    sha.map_or("-", |s| s.get(..7).unwrap_or(s))
}

/// Applications table.
#[must_use]
pub fn render_applications(apps: &[Application]) -> String {
    if apps.is_empty() {
        return "No applications. Add one with `upkeep apps add <NAME> --provider <PROVIDER>`."
            .to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<6} {:<24} {:<12} {:<20} URL", "ID", "Name", "Provider", "Tags");
    let _ = writeln!(out, "{:-<6} {:-<24} {:-<12} {:-<20} {:-<20}", "", "", "", "", "");
    for app in apps {
        let _ = writeln!(
            out,
            "{:<6} {:<24} {:<12} {:<20} {}",
            app.id,
            app.name,
            app.provider.slug(),
            app.tags.join(","),
            app.url.as_deref().unwrap_or("-")
        );
    }
    out.trim_end().to_string()
}

/// One created/updated application with its bindings.
#[must_use]
pub fn render_application(app: &Application, bindings: &[ProviderBinding]) -> String {
    let mut out = format!("Application {} ({})\n", app.id, app.name);
    let _ = writeln!(out, "  provider: {}", app.provider.display_name());
    if let Some(url) = &app.url {
        let _ = writeln!(out, "  url:      {url}");
    }
    if !app.tags.is_empty() {
        let _ = writeln!(out, "  tags:     {}", app.tags.join(", "));
    }
    for binding in bindings {
        let _ = writeln!(out, "  bound:    {} -> {}", binding.provider.slug(), binding.resource);
    }
    out.trim_end().to_string()
}

/// Connected providers.
#[must_use]
pub fn render_connected(user_id: &str, providers: &[Provider]) -> String {
    if providers.is_empty() {
        return format!("No providers connected for {user_id}.");
    }
    let mut out = format!("Connected providers for {user_id}:\n");
    for provider in providers {
        let _ = writeln!(out, "  {:<12} {}", provider.slug(), provider.display_name());
    }
    out.trim_end().to_string()
}

/// Per-provider sync outcomes.
#[must_use]
pub fn render_sync(result: &SyncResult) -> String {
    let elapsed = result.finished_at - result.started_at;
    let mut out = format!(
        "Sync of application {} finished in {}ms\n",
        result.application_id,
        elapsed.num_milliseconds()
    );
    if result.providers.is_empty() {
        out.push_str("  no providers bound");
        return out;
    }
    for (provider, outcome) in &result.providers {
        let status = match outcome.status {
            SyncStatus::Ok => "ok",
            SyncStatus::Skipped => "skipped",
            SyncStatus::Failed => "FAILED",
        };
        let _ = writeln!(
            out,
            "  {:<12} {:<8} {} (attempts: {})",
            provider.slug(),
            status,
            outcome.detail,
            outcome.attempts
        );
    }
    out.trim_end().to_string()
}

/// Deployments table.
#[must_use]
pub fn render_deployments(deployments: &[Deployment]) -> String {
    if deployments.is_empty() {
        return "No deployments stored. Run `upkeep sync <APP_ID>` first.".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16} {:<12} {:<10} {:<8} {:<24} URL",
        "Created", "Provider", "Status", "Commit", "External ID"
    );
    for d in deployments {
        let _ = writeln!(
            out,
            "{:<16} {:<12} {:<10} {:<8} {:<24} {}",
            short_time(&d.created_at),
            d.provider.slug(),
            d.status,
            short_sha(d.commit_sha.as_deref()),
            d.external_id,
            d.url.as_deref().unwrap_or("-")
        );
    }
    out.trim_end().to_string()
}

/// A single run.
#[must_use]
pub fn render_run(run: &MaintenanceRun) -> String {
    let mut out = format!(
        "Run {}: command {} is {} (run at {})",
        run.id,
        run.command_type_id,
        run.status,
        short_time(&run.run_at)
    );
    if let Some(notes) = &run.notes {
        let _ = write!(out, "\n  notes: {notes}");
    }
    if let Some(results) = &run.results {
        let _ = write!(out, "\n  results: {results}");
    }
    out
}

/// Run history table.
#[must_use]
pub fn render_history(runs: &[MaintenanceRun]) -> String {
    if runs.is_empty() {
        return "No maintenance runs recorded.".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<6} {:<16} {:<8} {:<10} Notes", "ID", "Run at", "Command", "Status");
    for run in runs {
        let _ = writeln!(
            out,
            "{:<6} {:<16} {:<8} {:<10} {}",
            run.id,
            short_time(&run.run_at),
            run.command_type_id,
            run.status,
            run.notes.as_deref().unwrap_or("")
        );
    }
    out.trim_end().to_string()
}

/// Checklist: every command type with its latest terminal run.
#[must_use]
pub fn render_checklist(entries: &[ChecklistEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<20} {:<10} {:<8} Updated", "Command", "Status", "Run");
    for entry in entries {
        match &entry.item {
            Some(item) => {
                let _ = writeln!(
                    out,
                    "{:<20} {:<10} {:<8} {}",
                    entry.command_type.name,
                    item.last_status,
                    item.last_run_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                    short_time(&item.updated_at)
                );
            }
            None => {
                let _ = writeln!(out, "{:<20} {:<10} {:<8} -", entry.command_type.name, "never", "-");
            }
        }
    }
    out.trim_end().to_string()
}

/// The command catalog.
#[must_use]
pub fn render_command_types(types: &[MaintenanceCommandType]) -> String {
    let mut out = String::new();
    for t in types {
        let _ = writeln!(out, "{:<4} {:<20} {}", t.id, t.name, t.description);
    }
    out.trim_end().to_string()
}
