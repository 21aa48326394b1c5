//! Maintenance run lifecycle and the derived checklist.
//!
//! Runs move `pending -> running -> {completed, failed, skipped}`; a run may
//! be recorded directly in any state. Terminal runs never change. Entering a
//! terminal state updates the (application, command type) checklist row in
//! the same transaction as the run itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::models::{
    ChecklistEntry, MaintenanceCommandType, MaintenanceRun, MaintenanceStatusItem, NewRun,
    RunStatus,
};
use crate::error::{Result, UpkeepError};
use crate::storage::Store;
use crate::storage::store::now;

/// Input for recording a run. Enum fields arrive as raw strings.
#[derive(Debug, Clone, Default)]
pub struct CreateRunRequest {
    pub application_id: i64,
    pub command_type_id: i64,
    pub status: String,
    pub results: Option<Value>,
    pub notes: Option<String>,
    /// Defaults to now.
    pub run_at: Option<DateTime<Utc>>,
}

/// Input for updating a run; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct UpdateRunRequest {
    pub run_id: i64,
    pub status: Option<String>,
    pub results: Option<Value>,
    pub notes: Option<String>,
}

fn require_id(field: &str, id: i64) -> Result<()> {
    if id <= 0 {
        return Err(UpkeepError::validation(field, "must be a positive id"));
    }
    Ok(())
}

fn validate_results(results: Option<&Value>) -> Result<()> {
    match results {
        None | Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(UpkeepError::validation("results", "must be a JSON object")),
    }
}

/// Moves a run to `requested`, or explains why it cannot.
fn apply_update(
    current: &MaintenanceRun,
    requested: RunStatus,
    results: Option<Value>,
    notes: Option<String>,
) -> Result<MaintenanceRun> {
    if !current.status.can_transition_to(requested) {
        return Err(UpkeepError::InvalidTransition {
            run_id: current.id,
            from: current.status.to_string(),
            to: requested.to_string(),
        });
    }

    let mut next = current.clone();
    next.status = requested;
    if results.is_some() {
        next.results = results;
    }
    if notes.is_some() {
        next.notes = notes;
    }
    Ok(next)
}

/// Maintenance run state machine over the store.
#[derive(Debug, Clone)]
pub struct MaintenanceEngine {
    store: Arc<Store>,
}

impl MaintenanceEngine {
    #[must_use]
    pub const fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Record a run in any initial state.
    ///
    /// # Errors
    /// `Validation` for malformed input, `NotFound` for an unknown application
    /// or command type. Nothing is written on error.
    pub fn create_run(&self, request: CreateRunRequest) -> Result<MaintenanceRun> {
        require_id("application_id", request.application_id)?;
        require_id("command_type_id", request.command_type_id)?;
        let status = RunStatus::parse(&request.status)?;
        validate_results(request.results.as_ref())?;

        self.require_application(request.application_id)?;
        self.require_command_type(request.command_type_id)?;

        let run = self.store.insert_run(&NewRun {
            application_id: request.application_id,
            command_type_id: request.command_type_id,
            status,
            results: request.results,
            notes: request.notes,
            run_at: request.run_at.unwrap_or_else(now),
        })?;

        tracing::info!(
            run_id = run.id,
            application_id = run.application_id,
            command_type_id = run.command_type_id,
            status = %run.status,
            "Recorded maintenance run"
        );
        Ok(run)
    }

    /// Update a live run's status, results or notes.
    ///
    /// # Errors
    /// `Validation` for malformed input, `NotFound` for an unknown run,
    /// `InvalidTransition` for a terminal run or an illegal status change.
    /// The stored run is unchanged on error.
    pub fn update_run(&self, request: UpdateRunRequest) -> Result<MaintenanceRun> {
        require_id("run_id", request.run_id)?;
        let status = request.status.as_deref().map(RunStatus::parse).transpose()?;
        validate_results(request.results.as_ref())?;
        if status.is_none() && request.results.is_none() && request.notes.is_none() {
            return Err(UpkeepError::validation(
                "update",
                "nothing to update; give a status, results or notes",
            ));
        }

        let UpdateRunRequest {
            run_id,
            results,
            notes,
            ..
        } = request;

        let updated = self
            .store
            .transition_run(run_id, |current| {
                apply_update(current, status.unwrap_or(current.status), results, notes)
            })
            .inspect_err(|err| {
                if matches!(err, UpkeepError::InvalidTransition { .. }) {
                    tracing::warn!(run_id, error = %err, "Rejected maintenance run update");
                }
            })?;

        tracing::info!(run_id, status = %updated.status, "Updated maintenance run");
        Ok(updated)
    }

    /// One run.
    ///
    /// # Errors
    /// `NotFound` for an unknown run.
    pub fn get_run(&self, run_id: i64) -> Result<MaintenanceRun> {
        self.store
            .get_run(run_id)?
            .ok_or_else(|| UpkeepError::not_found("maintenance run", run_id))
    }

    /// Run history of an application, newest first.
    ///
    /// # Errors
    /// `NotFound` for an unknown application.
    pub fn history(&self, application_id: i64) -> Result<Vec<MaintenanceRun>> {
        self.require_application(application_id)?;
        self.store.runs_for_application(application_id)
    }

    /// One entry per catalog command type with its latest terminal status.
    ///
    /// # Errors
    /// `NotFound` for an unknown application.
    pub fn checklist(&self, application_id: i64) -> Result<Vec<ChecklistEntry>> {
        self.require_application(application_id)?;
        let mut items = self.store.status_items(application_id)?;

        Ok(self
            .store
            .command_types()?
            .into_iter()
            .map(|command_type| {
                let item = items
                    .iter()
                    .position(|i| i.command_type_id == command_type.id)
                    .map(|idx| items.swap_remove(idx));
                ChecklistEntry { command_type, item }
            })
            .collect())
    }

    /// Checklist row for one (application, command type) pair.
    ///
    /// # Errors
    /// Returns an error if the store query fails.
    pub fn status_item(
        &self,
        application_id: i64,
        command_type_id: i64,
    ) -> Result<Option<MaintenanceStatusItem>> {
        self.store.status_item(application_id, command_type_id)
    }

    /// The command catalog.
    ///
    /// # Errors
    /// Returns an error if the store query fails.
    pub fn command_types(&self) -> Result<Vec<MaintenanceCommandType>> {
        self.store.command_types()
    }

    fn require_application(&self, application_id: i64) -> Result<()> {
        self.store
            .get_application(application_id)?
            .map(|_| ())
            .ok_or_else(|| UpkeepError::not_found("application", application_id))
    }

    fn require_command_type(&self, command_type_id: i64) -> Result<()> {
        self.store
            .command_type(command_type_id)?
            .map(|_| ())
            .ok_or_else(|| UpkeepError::not_found("command type", command_type_id))
    }
}
