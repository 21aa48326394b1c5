//! SQLite persistence for applications, credentials, deployments and
//! maintenance runs.
//!
//! The connection sits behind a mutex; every method holds it for one short
//! statement or transaction. Multi-row writes (deployment batches, a run plus
//! its checklist row) are atomic.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

use super::schema::run_migrations;
use crate::core::models::{
    Application, Deployment, DeploymentStatus, MaintenanceCommandType, MaintenanceRun,
    MaintenanceStatusItem, NewApplication, NewDeployment, NewRun, ProviderBinding,
    ProviderCredential, RunStatus,
};
use crate::core::provider::Provider;
use crate::error::{Result, UpkeepError};

const APPLICATION_COLUMNS: &str = "id, user_id, name, url, provider, tags, created_at";
const DEPLOYMENT_COLUMNS: &str =
    "id, application_id, provider, external_id, status, url, commit_sha, created_at";
const RUN_COLUMNS: &str =
    "id, application_id, command_type_id, status, results, notes, run_at, updated_at";
const STATUS_ITEM_COLUMNS: &str =
    "application_id, command_type_id, last_run_id, last_status, updated_at";

/// Database access layer.
pub struct Store {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

/// Current time at the precision stored in the database.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decode_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn decode_provider(idx: usize, raw: &str) -> rusqlite::Result<Provider> {
    Provider::from_slug(raw).map_err(|e| conversion_error(idx, e))
}

fn decode_run_status(idx: usize, raw: &str) -> rusqlite::Result<RunStatus> {
    RunStatus::parse(raw).map_err(|e| conversion_error(idx, e))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<Application> {
    let provider: String = row.get(4)?;
    let tags: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(Application {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        provider: decode_provider(4, &provider)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_error(5, e))?,
        created_at: decode_ts(6, &created_at)?,
    })
}

fn deployment_from_row(row: &Row<'_>) -> rusqlite::Result<Deployment> {
    let provider: String = row.get(2)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    Ok(Deployment {
        id: row.get(0)?,
        application_id: row.get(1)?,
        provider: decode_provider(2, &provider)?,
        external_id: row.get(3)?,
        status: DeploymentStatus::from_stored(&status),
        url: row.get(5)?,
        commit_sha: row.get(6)?,
        created_at: decode_ts(7, &created_at)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<MaintenanceRun> {
    let status: String = row.get(3)?;
    let results: Option<String> = row.get(4)?;
    let run_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(MaintenanceRun {
        id: row.get(0)?,
        application_id: row.get(1)?,
        command_type_id: row.get(2)?,
        status: decode_run_status(3, &status)?,
        results: results
            .map(|r| serde_json::from_str(&r))
            .transpose()
            .map_err(|e| conversion_error(4, e))?,
        notes: row.get(5)?,
        run_at: decode_ts(6, &run_at)?,
        updated_at: decode_ts(7, &updated_at)?,
    })
}

fn status_item_from_row(row: &Row<'_>) -> rusqlite::Result<MaintenanceStatusItem> {
    let last_status: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(MaintenanceStatusItem {
        application_id: row.get(0)?,
        command_type_id: row.get(1)?,
        last_run_id: row.get(2)?,
        last_status: decode_run_status(3, &last_status)?,
        updated_at: decode_ts(4, &updated_at)?,
    })
}

fn select_run(conn: &Connection, id: i64) -> Result<Option<MaintenanceRun>> {
    Ok(conn
        .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM maintenance_runs WHERE id = ?1"),
            [id],
            run_from_row,
        )
        .optional()?)
}

fn upsert_status_item(conn: &Connection, run: &MaintenanceRun) -> Result<()> {
    conn.execute(
        "INSERT INTO maintenance_status_items \
            (application_id, command_type_id, last_run_id, last_status, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(application_id, command_type_id) DO UPDATE SET \
            last_run_id = excluded.last_run_id, \
            last_status = excluded.last_status, \
            updated_at = excluded.updated_at",
        params![
            run.application_id,
            run.command_type_id,
            run.id,
            run.status.as_str(),
            encode_ts(&run.updated_at),
        ],
    )?;
    Ok(())
}

fn encode_results(run_results: Option<&serde_json::Value>) -> Result<Option<String>> {
    Ok(run_results.map(serde_json::to_string).transpose()?)
}

impl Store {
    /// Create or open a database at the given path.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the database
    /// cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)
            .map_err(|e| UpkeepError::Storage(format!("open {}: {e}", path.display())))?;
        run_migrations(&mut conn)?;

        tracing::debug!(path = %path.display(), "Opened store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    /// Returns an error if the in-memory database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| UpkeepError::Storage(format!("open in-memory db: {e}")))?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| UpkeepError::Storage("connection mutex poisoned".to_string()))
    }

    // =========================================================================
    // Applications
    // =========================================================================

    /// Insert an application.
    ///
    /// # Errors
    /// Returns a validation error if the user already has an application with
    /// this name.
    pub fn create_application(&self, app: &NewApplication) -> Result<Application> {
        let created_at = now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO applications (user_id, name, url, provider, tags, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                app.user_id,
                app.name,
                app.url,
                app.provider.slug(),
                serde_json::to_string(&app.tags)?,
                encode_ts(&created_at),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                UpkeepError::validation("name", format!("application '{}' already exists", app.name))
            } else {
                e.into()
            }
        })?;

        Ok(Application {
            id: conn.last_insert_rowid(),
            user_id: app.user_id.clone(),
            name: app.name.clone(),
            url: app.url.clone(),
            provider: app.provider,
            tags: app.tags.clone(),
            created_at,
        })
    }

    /// Fetch an application by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_application(&self, id: i64) -> Result<Option<Application>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"),
                [id],
                application_from_row,
            )
            .optional()?)
    }

    /// All applications owned by a user, by name.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_applications(&self, user_id: &str) -> Result<Vec<Application>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE user_id = ?1 ORDER BY name"
        ))?;
        let rows = stmt.query_map([user_id], application_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete an application; bindings, deployments, runs and checklist rows
    /// go with it.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn delete_application(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM applications WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// Attach (or re-point) a provider resource to an application.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn bind_provider(&self, binding: &ProviderBinding) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO provider_bindings (application_id, provider, resource) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(application_id, provider) DO UPDATE SET resource = excluded.resource",
            params![
                binding.application_id,
                binding.provider.slug(),
                binding.resource
            ],
        )?;
        Ok(())
    }

    /// Provider bindings of an application, in provider order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn bindings(&self, application_id: i64) -> Result<Vec<ProviderBinding>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT application_id, provider, resource FROM provider_bindings \
             WHERE application_id = ?1",
        )?;
        let rows = stmt.query_map([application_id], |row| {
            let provider: String = row.get(1)?;
            Ok(ProviderBinding {
                application_id: row.get(0)?,
                provider: decode_provider(1, &provider)?,
                resource: row.get(2)?,
            })
        })?;
        let mut bindings = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        bindings.sort_by_key(|b| b.provider);
        Ok(bindings)
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Insert or overwrite the credential for (user, provider).
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn save_credential(&self, credential: &ProviderCredential) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO credentials (user_id, provider, token, team_id, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(user_id, provider) DO UPDATE SET \
                token = excluded.token, team_id = excluded.team_id, updated_at = excluded.updated_at",
            params![
                credential.user_id,
                credential.provider.slug(),
                credential.token,
                credential.team_id,
                encode_ts(&now()),
            ],
        )?;
        Ok(())
    }

    /// Load the credential for (user, provider).
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn load_credential(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<ProviderCredential>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT token, team_id FROM credentials WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider.slug()],
                |row| {
                    Ok(ProviderCredential {
                        user_id: user_id.to_string(),
                        provider,
                        token: row.get(0)?,
                        team_id: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    /// Delete the credential for (user, provider).
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn delete_credential(&self, user_id: &str, provider: Provider) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM credentials WHERE user_id = ?1 AND provider = ?2",
            params![user_id, provider.slug()],
        )?;
        Ok(deleted > 0)
    }

    /// Providers a user has credentials for.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn credential_providers(&self, user_id: &str) -> Result<Vec<Provider>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached("SELECT provider FROM credentials WHERE user_id = ?1")?;
        let rows = stmt.query_map([user_id], |row| {
            let provider: String = row.get(0)?;
            decode_provider(0, &provider)
        })?;
        let mut providers = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        providers.sort();
        Ok(providers)
    }

    // =========================================================================
    // Deployments
    // =========================================================================

    /// Upsert deployments by (application, provider, external id).
    ///
    /// Existing rows keep their id and have every other field replaced.
    /// Returns the number of distinct deployments written; a key repeated in
    /// the input counts once and its last occurrence wins.
    ///
    /// # Errors
    /// Returns an error if any write fails; nothing is written in that case.
    pub fn upsert_deployments(&self, deployments: &[NewDeployment]) -> Result<usize> {
        let synced_at = encode_ts(&now());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO deployments \
                    (application_id, provider, external_id, status, url, commit_sha, created_at, synced_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(application_id, provider, external_id) DO UPDATE SET \
                    status = excluded.status, \
                    url = excluded.url, \
                    commit_sha = excluded.commit_sha, \
                    created_at = excluded.created_at, \
                    synced_at = excluded.synced_at",
            )?;
            for d in deployments {
                stmt.execute(params![
                    d.application_id,
                    d.provider.slug(),
                    d.external_id,
                    d.status.as_str(),
                    d.url,
                    d.commit_sha,
                    encode_ts(&d.created_at),
                    synced_at,
                ])?;
            }
        }
        tx.commit()?;
        let distinct: HashSet<_> = deployments
            .iter()
            .map(|d| (d.application_id, d.provider, d.external_id.as_str()))
            .collect();
        Ok(distinct.len())
    }

    /// Deployments of an application, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn deployments(&self, application_id: i64) -> Result<Vec<Deployment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE application_id = ?1 \
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([application_id], deployment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// The maintenance command catalog.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn command_types(&self) -> Result<Vec<MaintenanceCommandType>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, description FROM maintenance_command_types ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MaintenanceCommandType {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// One catalog entry.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn command_type(&self, id: i64) -> Result<Option<MaintenanceCommandType>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, description FROM maintenance_command_types WHERE id = ?1",
                [id],
                |row| {
                    Ok(MaintenanceCommandType {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    /// Append a run; a terminal run also updates its checklist row.
    ///
    /// # Errors
    /// Returns an error if either write fails; nothing is written in that case.
    pub fn insert_run(&self, run: &NewRun) -> Result<MaintenanceRun> {
        let updated_at = now();
        let results = encode_results(run.results.as_ref())?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO maintenance_runs \
                (application_id, command_type_id, status, results, notes, run_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.application_id,
                run.command_type_id,
                run.status.as_str(),
                results,
                run.notes,
                encode_ts(&run.run_at),
                encode_ts(&updated_at),
            ],
        )?;

        let stored = MaintenanceRun {
            id: tx.last_insert_rowid(),
            application_id: run.application_id,
            command_type_id: run.command_type_id,
            status: run.status,
            results: run.results.clone(),
            notes: run.notes.clone(),
            run_at: run.run_at.trunc_subsecs(6),
            updated_at,
        };
        if stored.status.is_terminal() {
            upsert_status_item(&tx, &stored)?;
        }
        tx.commit()?;
        Ok(stored)
    }

    /// Read-check-write a run atomically.
    ///
    /// `apply` receives the stored run and returns its replacement or an error;
    /// on error nothing is written. A terminal replacement also updates the
    /// checklist row in the same transaction.
    ///
    /// # Errors
    /// `NotFound` for an unknown run, whatever `apply` returns, or storage errors.
    pub fn transition_run<F>(&self, id: i64, apply: F) -> Result<MaintenanceRun>
    where
        F: FnOnce(&MaintenanceRun) -> Result<MaintenanceRun>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current = select_run(&tx, id)?.ok_or_else(|| UpkeepError::not_found("maintenance run", id))?;
        let mut next = apply(&current)?;
        next.updated_at = now();

        tx.execute(
            "UPDATE maintenance_runs SET status = ?2, results = ?3, notes = ?4, updated_at = ?5 \
             WHERE id = ?1",
            params![
                id,
                next.status.as_str(),
                encode_results(next.results.as_ref())?,
                next.notes,
                encode_ts(&next.updated_at),
            ],
        )?;
        if next.status.is_terminal() {
            upsert_status_item(&tx, &next)?;
        }
        tx.commit()?;
        Ok(next)
    }

    /// One run by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_run(&self, id: i64) -> Result<Option<MaintenanceRun>> {
        let conn = self.conn()?;
        select_run(&conn, id)
    }

    /// Run history of an application, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn runs_for_application(&self, application_id: i64) -> Result<Vec<MaintenanceRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RUN_COLUMNS} FROM maintenance_runs WHERE application_id = ?1 \
             ORDER BY run_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([application_id], run_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Checklist row for (application, command type).
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn status_item(
        &self,
        application_id: i64,
        command_type_id: i64,
    ) -> Result<Option<MaintenanceStatusItem>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {STATUS_ITEM_COLUMNS} FROM maintenance_status_items \
                     WHERE application_id = ?1 AND command_type_id = ?2"
                ),
                [application_id, command_type_id],
                status_item_from_row,
            )
            .optional()?)
    }

    /// All checklist rows of an application.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn status_items(&self, application_id: i64) -> Result<Vec<MaintenanceStatusItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {STATUS_ITEM_COLUMNS} FROM maintenance_status_items \
             WHERE application_id = ?1 ORDER BY command_type_id"
        ))?;
        let rows = stmt.query_map([application_id], status_item_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_app() -> (Store, Application) {
        let store = Store::open_in_memory().expect("open store");
        let app = store
            .create_application(&NewApplication {
                user_id: "user-1".to_string(),
                name: "storefront".to_string(),
                url: Some("https://shop.example.com".to_string()),
                provider: Provider::Vercel,
                tags: vec!["prod".to_string()],
            })
            .expect("create app");
        (store, app)
    }

    fn deployment(app: i64, external_id: &str, status: DeploymentStatus) -> NewDeployment {
        NewDeployment {
            application_id: app,
            provider: Provider::Vercel,
            external_id: external_id.to_string(),
            status,
            url: None,
            commit_sha: None,
            created_at: now(),
        }
    }

    #[test]
    fn application_round_trips() {
        let (store, app) = store_with_app();
        let loaded = store.get_application(app.id).unwrap().unwrap();
        assert_eq!(loaded, app);
        assert_eq!(store.list_applications("user-1").unwrap(), vec![app]);
        assert!(store.list_applications("someone-else").unwrap().is_empty());
    }

    #[test]
    fn duplicate_application_name_is_rejected() {
        let (store, app) = store_with_app();
        let err = store
            .create_application(&NewApplication {
                user_id: app.user_id.clone(),
                name: app.name.clone(),
                url: None,
                provider: Provider::Github,
                tags: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, UpkeepError::Validation { ref field, .. } if field == "name"));
    }

    #[test]
    fn upsert_replaces_by_natural_key() {
        let (store, app) = store_with_app();
        store
            .upsert_deployments(&[deployment(app.id, "dpl_1", DeploymentStatus::Building)])
            .unwrap();
        let first = store.deployments(app.id).unwrap();

        store
            .upsert_deployments(&[deployment(app.id, "dpl_1", DeploymentStatus::Ready)])
            .unwrap();
        let second = store.deployments(app.id).unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].status, DeploymentStatus::Ready);
    }

    #[test]
    fn repeated_keys_count_once() {
        let (store, app) = store_with_app();
        let written = store
            .upsert_deployments(&[
                deployment(app.id, "dpl_1", DeploymentStatus::Building),
                deployment(app.id, "dpl_2", DeploymentStatus::Ready),
                deployment(app.id, "dpl_1", DeploymentStatus::Ready),
            ])
            .unwrap();
        assert_eq!(written, 2);
        let stored = store.deployments(app.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|d| d.status == DeploymentStatus::Ready));
    }

    #[test]
    fn credentials_overwrite_and_delete() {
        let (store, _) = store_with_app();
        let mut cred = ProviderCredential {
            user_id: "user-1".to_string(),
            provider: Provider::Vercel,
            token: "old".to_string(),
            team_id: None,
        };
        store.save_credential(&cred).unwrap();
        cred.token = "new".to_string();
        cred.team_id = Some("team_1".to_string());
        store.save_credential(&cred).unwrap();

        let loaded = store.load_credential("user-1", Provider::Vercel).unwrap().unwrap();
        assert_eq!(loaded, cred);
        assert_eq!(store.credential_providers("user-1").unwrap(), vec![Provider::Vercel]);

        assert!(store.delete_credential("user-1", Provider::Vercel).unwrap());
        assert!(!store.delete_credential("user-1", Provider::Vercel).unwrap());
        assert!(store.load_credential("user-1", Provider::Vercel).unwrap().is_none());
    }

    #[test]
    fn terminal_insert_updates_checklist() {
        let (store, app) = store_with_app();
        let run = store
            .insert_run(&NewRun {
                application_id: app.id,
                command_type_id: 2,
                status: RunStatus::Completed,
                results: Some(json!({"exitCode": 0})),
                notes: None,
                run_at: now(),
            })
            .unwrap();

        let item = store.status_item(app.id, 2).unwrap().unwrap();
        assert_eq!(item.last_run_id, Some(run.id));
        assert_eq!(item.last_status, RunStatus::Completed);
        assert_eq!(store.get_run(run.id).unwrap().unwrap(), run);
    }

    #[test]
    fn failed_apply_leaves_run_untouched() {
        let (store, app) = store_with_app();
        let run = store
            .insert_run(&NewRun {
                application_id: app.id,
                command_type_id: 1,
                status: RunStatus::Pending,
                results: None,
                notes: None,
                run_at: now(),
            })
            .unwrap();

        let err = store
            .transition_run(run.id, |_| Err(UpkeepError::validation("status", "nope")))
            .unwrap_err();
        assert!(matches!(err, UpkeepError::Validation { .. }));
        assert_eq!(store.get_run(run.id).unwrap().unwrap(), run);
        assert!(store.status_item(app.id, 1).unwrap().is_none());
    }

    #[test]
    fn deleting_application_cascades() {
        let (store, app) = store_with_app();
        store
            .bind_provider(&ProviderBinding {
                application_id: app.id,
                provider: Provider::Vercel,
                resource: "prj_1".to_string(),
            })
            .unwrap();
        store
            .upsert_deployments(&[deployment(app.id, "dpl_1", DeploymentStatus::Ready)])
            .unwrap();
        store
            .insert_run(&NewRun {
                application_id: app.id,
                command_type_id: 1,
                status: RunStatus::Completed,
                results: None,
                notes: None,
                run_at: now(),
            })
            .unwrap();

        assert!(store.delete_application(app.id).unwrap());
        assert!(store.get_application(app.id).unwrap().is_none());
        assert!(store.bindings(app.id).unwrap().is_empty());
        assert!(store.deployments(app.id).unwrap().is_empty());
        assert!(store.runs_for_application(app.id).unwrap().is_empty());
        assert!(store.status_items(app.id).unwrap().is_empty());
    }
}
