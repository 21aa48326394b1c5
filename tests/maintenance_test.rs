//! Maintenance lifecycle through the engine: recording, transitions, the
//! derived checklist, and history ordering.

mod common;

use chrono::{TimeDelta, Utc};
use serde_json::json;

use upkeep::core::models::RunStatus;
use upkeep::core::{CreateRunRequest, UpdateRunRequest};
use upkeep::error::UpkeepError;

use common::fixtures::{add_app, engine, fast_settings};

const BACKUP_CHECK: i64 = 2;

fn fresh_engine() -> upkeep::core::Upkeep {
    engine("http://127.0.0.1:9", fast_settings(1))
}

#[test]
fn completed_run_appears_in_checklist() {
    let upkeep = fresh_engine();
    let app = add_app(&upkeep, "web", "github");

    let run = upkeep
        .create_maintenance_run(CreateRunRequest {
            application_id: app.id,
            command_type_id: BACKUP_CHECK,
            status: "completed".to_string(),
            results: Some(json!({"restored": true})),
            notes: Some("weekly".to_string()),
            run_at: None,
        })
        .unwrap();

    let checklist = upkeep.checklist(app.id).unwrap();
    let catalog = upkeep.command_types().unwrap();
    assert_eq!(checklist.len(), catalog.len());

    let backup = checklist
        .iter()
        .find(|e| e.command_type.id == BACKUP_CHECK)
        .unwrap();
    let item = backup.item.as_ref().unwrap();
    assert_eq!(item.last_status, RunStatus::Completed);
    assert_eq!(item.last_run_id, Some(run.id));

    assert!(
        checklist
            .iter()
            .filter(|e| e.command_type.id != BACKUP_CHECK)
            .all(|e| e.item.is_none())
    );
}

#[test]
fn live_run_reaches_checklist_only_when_terminal() {
    let upkeep = fresh_engine();
    let app = add_app(&upkeep, "web", "github");

    let run = upkeep
        .create_maintenance_run(CreateRunRequest {
            application_id: app.id,
            command_type_id: BACKUP_CHECK,
            status: "pending".to_string(),
            ..CreateRunRequest::default()
        })
        .unwrap();
    assert!(upkeep.maintenance().status_item(app.id, BACKUP_CHECK).unwrap().is_none());

    upkeep
        .update_maintenance_run(UpdateRunRequest {
            run_id: run.id,
            status: Some("running".to_string()),
            ..UpdateRunRequest::default()
        })
        .unwrap();
    assert!(upkeep.maintenance().status_item(app.id, BACKUP_CHECK).unwrap().is_none());

    let finished = upkeep
        .update_maintenance_run(UpdateRunRequest {
            run_id: run.id,
            status: Some("failed".to_string()),
            notes: Some("restore timed out".to_string()),
            ..UpdateRunRequest::default()
        })
        .unwrap();
    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.notes.as_deref(), Some("restore timed out"));

    let item = upkeep
        .maintenance()
        .status_item(app.id, BACKUP_CHECK)
        .unwrap()
        .unwrap();
    assert_eq!(item.last_status, RunStatus::Failed);
    assert_eq!(item.last_run_id, Some(run.id));
}

#[test]
fn terminal_runs_are_immutable() {
    let upkeep = fresh_engine();
    let app = add_app(&upkeep, "web", "github");
    let run = upkeep
        .create_maintenance_run(CreateRunRequest {
            application_id: app.id,
            command_type_id: 1,
            status: "completed".to_string(),
            ..CreateRunRequest::default()
        })
        .unwrap();

    for status in ["running", "failed", "completed"] {
        let err = upkeep
            .update_maintenance_run(UpdateRunRequest {
                run_id: run.id,
                status: Some(status.to_string()),
                ..UpdateRunRequest::default()
            })
            .unwrap_err();
        assert!(matches!(err, UpkeepError::InvalidTransition { .. }), "{status}");
        assert_eq!(err.error_code(), "UPK-M001");
    }

    let err = upkeep
        .update_maintenance_run(UpdateRunRequest {
            run_id: run.id,
            notes: Some("late note".to_string()),
            ..UpdateRunRequest::default()
        })
        .unwrap_err();
    assert!(matches!(err, UpkeepError::InvalidTransition { .. }));

    let stored = upkeep.maintenance().get_run(run.id).unwrap();
    assert_eq!(stored, run);
}

#[test]
fn history_is_newest_first() {
    let upkeep = fresh_engine();
    let app = add_app(&upkeep, "web", "github");
    let now = Utc::now();

    for (days_ago, command) in [(3, 1), (1, 2), (2, 3)] {
        upkeep
            .create_maintenance_run(CreateRunRequest {
                application_id: app.id,
                command_type_id: command,
                status: "completed".to_string(),
                run_at: Some(now - TimeDelta::days(days_ago)),
                ..CreateRunRequest::default()
            })
            .unwrap();
    }

    let history = upkeep.history(app.id).unwrap();
    assert_eq!(
        history.iter().map(|r| r.command_type_id).collect::<Vec<_>>(),
        vec![2, 3, 1]
    );
}

#[test]
fn bad_input_writes_nothing() {
    let upkeep = fresh_engine();
    let app = add_app(&upkeep, "web", "github");

    let cases = [
        CreateRunRequest {
            application_id: app.id,
            command_type_id: 1,
            status: "done".to_string(),
            ..CreateRunRequest::default()
        },
        CreateRunRequest {
            application_id: app.id,
            command_type_id: 999,
            status: "completed".to_string(),
            ..CreateRunRequest::default()
        },
        CreateRunRequest {
            application_id: app.id + 100,
            command_type_id: 1,
            status: "completed".to_string(),
            ..CreateRunRequest::default()
        },
        CreateRunRequest {
            application_id: app.id,
            command_type_id: 1,
            status: "completed".to_string(),
            results: Some(json!(["not", "an", "object"])),
            ..CreateRunRequest::default()
        },
    ];
    for case in cases {
        assert!(upkeep.create_maintenance_run(case).is_err());
    }

    assert!(upkeep.history(app.id).unwrap().is_empty());
    assert!(upkeep.checklist(app.id).unwrap().iter().all(|e| e.item.is_none()));
}
