//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! fixed-width RFC 3339 UTC strings so SQL comparisons order correctly.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::actors::{Actor, ActorRole};
use crate::error::DatabaseError;
use crate::flows::habit_log::HabitLog;
use crate::invitations::model::{ClientDetails, Invitation, InvitationStatus};
use crate::relationships::model::{ConnectionStatus, Edge};
use crate::store::migrations;
use crate::store::traits::Database;
use crate::tasks::{AbandonedSnapshot, StepData, Task, TaskStatus, TaskType};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format for timestamps.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Parse an enum column stored via `as_str()`.
fn parse_col<T: FromStr<Err = String>>(s: &str) -> Result<T, DatabaseError> {
    s.parse().map_err(DatabaseError::Serialization)
}

fn row_err(ctx: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Query(format!("{ctx} row parse: {e}"))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Classify a write error: unique-index violations become `Constraint`.
fn write_err(ctx: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{ctx}: {msg}"))
    } else {
        DatabaseError::Query(format!("{ctx}: {msg}"))
    }
}

/// Column order for TASK_COLUMNS:
/// 0:id, 1:actor_key, 2:actor_role, 3:task_type, 4:status, 5:step_data,
/// 6:last_activity_at, 7:reminder_sent, 8:version, 9:created_at, 10:updated_at
fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let err = row_err("task");
    let id_str: String = row.get(0).map_err(&err)?;
    let step_data_str: String = row.get(5).map_err(&err)?;
    let step_data = StepData::from_json(&step_data_str)
        .map_err(|e| DatabaseError::Serialization(format!("task {id_str} step_data: {e}")))?;

    Ok(Task {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("task id {id_str}: {e}")))?,
        actor_key: row.get(1).map_err(&err)?,
        actor_role: parse_col(&row.get::<String>(2).map_err(&err)?)?,
        task_type: parse_col(&row.get::<String>(3).map_err(&err)?)?,
        status: parse_col(&row.get::<String>(4).map_err(&err)?)?,
        step_data,
        last_activity_at: parse_datetime(&row.get::<String>(6).map_err(&err)?),
        reminder_sent: row.get::<i64>(7).map_err(&err)? != 0,
        version: row.get(8).map_err(&err)?,
        created_at: parse_datetime(&row.get::<String>(9).map_err(&err)?),
        updated_at: parse_datetime(&row.get::<String>(10).map_err(&err)?),
    })
}

/// 0:actor_key, 1:actor_role, 2:task_type, 3:step, 4:step_data, 5:abandoned_at
fn row_to_snapshot(row: &libsql::Row) -> Result<AbandonedSnapshot, DatabaseError> {
    let err = row_err("abandoned_task");
    let step_data_str: String = row.get(4).map_err(&err)?;
    Ok(AbandonedSnapshot {
        actor_key: row.get(0).map_err(&err)?,
        actor_role: parse_col(&row.get::<String>(1).map_err(&err)?)?,
        task_type: parse_col(&row.get::<String>(2).map_err(&err)?)?,
        step: row.get(3).map_err(&err)?,
        step_data: StepData::from_json(&step_data_str)
            .map_err(|e| DatabaseError::Serialization(format!("snapshot step_data: {e}")))?,
        abandoned_at: parse_datetime(&row.get::<String>(5).map_err(&err)?),
    })
}

/// 0:actor_key, 1:role, 2:name, 3:email, 4:business_name,
/// 5:profile_complete, 6:created_at, 7:updated_at
fn row_to_actor(row: &libsql::Row) -> Result<Actor, DatabaseError> {
    let err = row_err("actor");
    Ok(Actor {
        actor_key: row.get(0).map_err(&err)?,
        role: parse_col(&row.get::<String>(1).map_err(&err)?)?,
        name: row.get(2).map_err(&err)?,
        email: row.get::<String>(3).ok(),
        business_name: row.get::<String>(4).ok(),
        profile_complete: row.get::<i64>(5).map_err(&err)? != 0,
        created_at: parse_datetime(&row.get::<String>(6).map_err(&err)?),
        updated_at: parse_datetime(&row.get::<String>(7).map_err(&err)?),
    })
}

/// 0:initiator_key, 1:target_key, 2:connection_status, 3:invited_by,
/// 4:created_at, 5:updated_at
fn row_to_edge(row: &libsql::Row) -> Result<Edge, DatabaseError> {
    let err = row_err("edge");
    Ok(Edge {
        initiator_key: row.get(0).map_err(&err)?,
        target_key: row.get(1).map_err(&err)?,
        connection_status: parse_col(&row.get::<String>(2).map_err(&err)?)?,
        invited_by: parse_col(&row.get::<String>(3).map_err(&err)?)?,
        created_at: parse_datetime(&row.get::<String>(4).map_err(&err)?),
        updated_at: parse_datetime(&row.get::<String>(5).map_err(&err)?),
    })
}

/// 0:token, 1:from_key, 2:to_contact, 3:status, 4:completion_mode,
/// 5:payload, 6:created_at, 7:expires_at, 8:responded_at
fn row_to_invitation(row: &libsql::Row) -> Result<Invitation, DatabaseError> {
    let err = row_err("invitation");
    let payload_str: String = row.get(5).map_err(&err)?;
    let payload: ClientDetails = serde_json::from_str(&payload_str)
        .map_err(|e| DatabaseError::Serialization(format!("invitation payload: {e}")))?;
    Ok(Invitation {
        token: row.get(0).map_err(&err)?,
        from_key: row.get(1).map_err(&err)?,
        to_contact: row.get(2).map_err(&err)?,
        status: parse_col(&row.get::<String>(3).map_err(&err)?)?,
        completion_mode: parse_col(&row.get::<String>(4).map_err(&err)?)?,
        payload,
        created_at: parse_datetime(&row.get::<String>(6).map_err(&err)?),
        expires_at: parse_datetime(&row.get::<String>(7).map_err(&err)?),
        responded_at: row.get::<String>(8).ok().map(|s| parse_datetime(&s)),
    })
}

/// 0:id, 1:actor_key, 2:habit, 3:value, 4:logged_at
fn row_to_habit_log(row: &libsql::Row) -> Result<HabitLog, DatabaseError> {
    let err = row_err("habit_log");
    let id_str: String = row.get(0).map_err(&err)?;
    Ok(HabitLog {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        actor_key: row.get(1).map_err(&err)?,
        habit: row.get(2).map_err(&err)?,
        value: row.get(3).map_err(&err)?,
        logged_at: parse_datetime(&row.get::<String>(4).map_err(&err)?),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const TASK_COLUMNS: &str = "id, actor_key, actor_role, task_type, status, step_data, last_activity_at, reminder_sent, version, created_at, updated_at";

const SNAPSHOT_COLUMNS: &str = "actor_key, actor_role, task_type, step, step_data, abandoned_at";

const ACTOR_COLUMNS: &str =
    "actor_key, role, name, email, business_name, profile_complete, created_at, updated_at";

const EDGE_COLUMNS: &str =
    "initiator_key, target_key, connection_status, invited_by, created_at, updated_at";

const INVITATION_COLUMNS: &str = "token, from_key, to_contact, status, completion_mode, payload, created_at, expires_at, responded_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let step_data = task
            .step_data
            .to_json()
            .map_err(|e| DatabaseError::Serialization(format!("insert_task: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO tasks (id, actor_key, actor_role, task_type, status, step, step_data, last_activity_at, reminder_sent, version, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    task.id.to_string(),
                    task.actor_key.as_str(),
                    task.actor_role.as_str(),
                    task.task_type.as_str(),
                    task.status.as_str(),
                    task.step(),
                    step_data,
                    fmt_ts(task.last_activity_at),
                    task.reminder_sent as i64,
                    task.version,
                    fmt_ts(task.created_at),
                    fmt_ts(task.updated_at),
                ],
            )
            .await
            .map_err(|e| write_err("insert_task", e))?;

        debug!(task_id = %task.id, task_type = %task.task_type, "Task inserted into DB");
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_task(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_task: {e}"))),
        }
    }

    async fn get_running_task(
        &self,
        actor_key: &str,
        role: ActorRole,
    ) -> Result<Option<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE actor_key = ?1 AND actor_role = ?2 AND status = 'running' LIMIT 1"
                ),
                params![actor_key, role.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_running_task: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_task(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_running_task: {e}"))),
        }
    }

    async fn update_task_data(
        &self,
        id: Uuid,
        expected_version: i64,
        step_data_json: &str,
        step: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let ts = fmt_ts(now);
        let affected = self
            .conn()
            .execute(
                "UPDATE tasks SET step_data = ?1, step = ?2, last_activity_at = ?3, updated_at = ?3, reminder_sent = 0, version = version + 1 WHERE id = ?4 AND version = ?5 AND status = 'running'",
                params![step_data_json, step, ts, id.to_string(), expected_version],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_task_data: {e}")))?;

        debug!(task_id = %id, step, applied = affected > 0, "Task step data updated");
        Ok(affected > 0)
    }

    async fn touch_task(
        &self,
        id: Uuid,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let ts = fmt_ts(now);
        let affected = self
            .conn()
            .execute(
                "UPDATE tasks SET last_activity_at = ?1, updated_at = ?1, version = version + 1 WHERE id = ?2 AND version = ?3 AND status = 'running'",
                params![ts, id.to_string(), expected_version],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch_task: {e}")))?;
        Ok(affected > 0)
    }

    async fn set_task_status(
        &self,
        id: Uuid,
        expected_version: i64,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let ts = fmt_ts(now);
        let affected = self
            .conn()
            .execute(
                "UPDATE tasks SET status = ?1, last_activity_at = ?2, updated_at = ?2, version = version + 1 WHERE id = ?3 AND version = ?4 AND status = 'running'",
                params![status.as_str(), ts, id.to_string(), expected_version],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_task_status: {e}")))?;

        debug!(task_id = %id, %status, applied = affected > 0, "Task status updated");
        Ok(affected > 0)
    }

    async fn mark_task_reminded(
        &self,
        id: Uuid,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE tasks SET reminder_sent = 1, updated_at = ?1, version = version + 1 WHERE id = ?2 AND version = ?3 AND status = 'running'",
                params![fmt_ts(now), id.to_string(), expected_version],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_task_reminded: {e}")))?;
        Ok(affected > 0)
    }

    async fn list_idle_running_tasks(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'running' AND last_activity_at <= ?1 ORDER BY last_activity_at ASC"
                ),
                params![fmt_ts(cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_idle_running_tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_task(&row) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    tracing::warn!("Skipping task row: {e}");
                }
            }
        }
        Ok(tasks)
    }

    async fn count_running_tasks(
        &self,
        actor_key: &str,
        role: ActorRole,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM tasks WHERE actor_key = ?1 AND actor_role = ?2 AND status = 'running'",
                params![actor_key, role.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_running_tasks: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("count_running_tasks: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_running_tasks: {e}"))),
        }
    }

    // ── Abandoned snapshots ─────────────────────────────────────────

    async fn save_abandoned_snapshot(
        &self,
        snapshot: &AbandonedSnapshot,
    ) -> Result<(), DatabaseError> {
        let step_data = snapshot
            .step_data
            .to_json()
            .map_err(|e| DatabaseError::Serialization(format!("save_abandoned_snapshot: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO abandoned_tasks (actor_key, actor_role, task_type, step, step_data, abandoned_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(actor_key, task_type) DO UPDATE SET actor_role = excluded.actor_role, step = excluded.step, step_data = excluded.step_data, abandoned_at = excluded.abandoned_at",
                params![
                    snapshot.actor_key.as_str(),
                    snapshot.actor_role.as_str(),
                    snapshot.task_type.as_str(),
                    snapshot.step.as_str(),
                    step_data,
                    fmt_ts(snapshot.abandoned_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_abandoned_snapshot: {e}")))?;
        Ok(())
    }

    async fn get_abandoned_snapshot(
        &self,
        actor_key: &str,
        task_type: TaskType,
    ) -> Result<Option<AbandonedSnapshot>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM abandoned_tasks WHERE actor_key = ?1 AND task_type = ?2"
                ),
                params![actor_key, task_type.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_abandoned_snapshot: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_snapshot(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_abandoned_snapshot: {e}"))),
        }
    }

    async fn delete_abandoned_snapshot(
        &self,
        actor_key: &str,
        task_type: TaskType,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM abandoned_tasks WHERE actor_key = ?1 AND task_type = ?2",
                params![actor_key, task_type.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_abandoned_snapshot: {e}")))?;
        Ok(affected > 0)
    }

    // ── Actors ──────────────────────────────────────────────────────

    async fn upsert_actor(&self, actor: &Actor) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO actors (actor_key, role, name, email, business_name, profile_complete, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(actor_key) DO UPDATE SET role = excluded.role, name = excluded.name, email = excluded.email, business_name = excluded.business_name, profile_complete = excluded.profile_complete, updated_at = excluded.updated_at",
                params![
                    actor.actor_key.as_str(),
                    actor.role.as_str(),
                    actor.name.as_str(),
                    opt_text(actor.email.as_deref()),
                    opt_text(actor.business_name.as_deref()),
                    actor.profile_complete as i64,
                    fmt_ts(actor.created_at),
                    fmt_ts(actor.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_actor: {e}")))?;

        debug!(actor_key = %actor.actor_key, role = %actor.role, "Actor saved");
        Ok(())
    }

    async fn insert_actor_if_absent(&self, actor: &Actor) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO actors (actor_key, role, name, email, business_name, profile_complete, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    actor.actor_key.as_str(),
                    actor.role.as_str(),
                    actor.name.as_str(),
                    opt_text(actor.email.as_deref()),
                    opt_text(actor.business_name.as_deref()),
                    actor.profile_complete as i64,
                    fmt_ts(actor.created_at),
                    fmt_ts(actor.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_actor_if_absent: {e}")))?;
        Ok(affected > 0)
    }

    async fn get_actor(&self, actor_key: &str) -> Result<Option<Actor>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACTOR_COLUMNS} FROM actors WHERE actor_key = ?1"),
                params![actor_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_actor: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_actor(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_actor: {e}"))),
        }
    }

    // ── Relationship edges ──────────────────────────────────────────

    async fn get_edge(
        &self,
        initiator_key: &str,
        target_key: &str,
    ) -> Result<Option<Edge>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EDGE_COLUMNS} FROM edges WHERE initiator_key = ?1 AND target_key = ?2"
                ),
                params![initiator_key, target_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_edge: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_edge(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_edge: {e}"))),
        }
    }

    async fn upsert_edge(&self, edge: &Edge) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO edges (initiator_key, target_key, connection_status, invited_by, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(initiator_key, target_key) DO UPDATE SET connection_status = excluded.connection_status, invited_by = excluded.invited_by, updated_at = excluded.updated_at",
                params![
                    edge.initiator_key.as_str(),
                    edge.target_key.as_str(),
                    edge.connection_status.as_str(),
                    edge.invited_by.as_str(),
                    fmt_ts(edge.created_at),
                    fmt_ts(edge.updated_at),
                ],
            )
            .await
            .map_err(|e| write_err("upsert_edge", e))?;

        debug!(
            initiator = %edge.initiator_key,
            target = %edge.target_key,
            status = %edge.connection_status,
            "Edge saved"
        );
        Ok(())
    }

    async fn list_edges_for_target(
        &self,
        target_key: &str,
        status: Option<ConnectionStatus>,
    ) -> Result<Vec<Edge>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EDGE_COLUMNS} FROM edges WHERE target_key = ?1 AND (?2 IS NULL OR connection_status = ?2) ORDER BY created_at ASC"
                ),
                params![target_key, opt_text(status.as_ref().map(|s| s.as_str()))],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_edges_for_target: {e}")))?;

        let mut edges = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            edges.push(row_to_edge(&row)?);
        }
        Ok(edges)
    }

    async fn list_edges_for_initiator(
        &self,
        initiator_key: &str,
        status: Option<ConnectionStatus>,
    ) -> Result<Vec<Edge>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EDGE_COLUMNS} FROM edges WHERE initiator_key = ?1 AND (?2 IS NULL OR connection_status = ?2) ORDER BY created_at ASC"
                ),
                params![initiator_key, opt_text(status.as_ref().map(|s| s.as_str()))],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_edges_for_initiator: {e}")))?;

        let mut edges = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            edges.push(row_to_edge(&row)?);
        }
        Ok(edges)
    }

    async fn count_edges(&self) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM edges", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_edges: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("count_edges: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_edges: {e}"))),
        }
    }

    // ── Invitations ─────────────────────────────────────────────────

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(&invitation.payload)
            .map_err(|e| DatabaseError::Serialization(format!("insert_invitation: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO invitations (token, from_key, to_contact, status, completion_mode, payload, created_at, expires_at, responded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    invitation.token.as_str(),
                    invitation.from_key.as_str(),
                    invitation.to_contact.as_str(),
                    invitation.status.as_str(),
                    invitation.completion_mode.as_str(),
                    payload,
                    fmt_ts(invitation.created_at),
                    fmt_ts(invitation.expires_at),
                    opt_text(invitation.responded_at.map(fmt_ts).as_deref()),
                ],
            )
            .await
            .map_err(|e| write_err("insert_invitation", e))?;

        debug!(token = %invitation.token, to = %invitation.to_contact, "Invitation inserted into DB");
        Ok(())
    }

    async fn get_invitation(&self, token: &str) -> Result<Option<Invitation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE token = ?1"),
                params![token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_invitation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_invitation(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_invitation: {e}"))),
        }
    }

    async fn find_open_invitation(
        &self,
        from_key: &str,
        to_contact: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INVITATION_COLUMNS} FROM invitations WHERE from_key = ?1 AND to_contact = ?2 AND status IN ('pending', 'pending_target_completion') AND expires_at > ?3 ORDER BY created_at DESC LIMIT 1"
                ),
                params![from_key, to_contact, fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_open_invitation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_invitation(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_open_invitation: {e}"))),
        }
    }

    async fn update_invitation_status(
        &self,
        token: &str,
        from: InvitationStatus,
        to: InvitationStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        // Only an actual answer from the contact records responded_at.
        let responded = matches!(to, InvitationStatus::Accepted | InvitationStatus::Declined)
            .then(|| fmt_ts(now));
        let affected = self
            .conn()
            .execute(
                "UPDATE invitations SET status = ?1, responded_at = COALESCE(?2, responded_at) WHERE token = ?3 AND status = ?4",
                params![to.as_str(), opt_text(responded.as_deref()), token, from.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_invitation_status: {e}")))?;

        debug!(token, %from, %to, applied = affected > 0, "Invitation status updated");
        Ok(affected > 0)
    }

    async fn expire_invitations(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE invitations SET status = 'expired' WHERE status IN ('pending', 'pending_target_completion') AND expires_at <= ?1",
                params![fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("expire_invitations: {e}")))?;
        Ok(affected as usize)
    }

    // ── Habit logs & analytics ──────────────────────────────────────

    async fn insert_habit_log(&self, log: &HabitLog) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO habit_logs (id, actor_key, habit, value, logged_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    log.id.to_string(),
                    log.actor_key.as_str(),
                    log.habit.as_str(),
                    log.value,
                    fmt_ts(log.logged_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_habit_log: {e}")))?;
        Ok(())
    }

    async fn list_habit_logs(&self, actor_key: &str) -> Result<Vec<HabitLog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, actor_key, habit, value, logged_at FROM habit_logs WHERE actor_key = ?1 ORDER BY logged_at ASC",
                params![actor_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_habit_logs: {e}")))?;

        let mut logs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            logs.push(row_to_habit_log(&row)?);
        }
        Ok(logs)
    }

    async fn record_event(
        &self,
        event: &str,
        actor_key: &str,
        data: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO analytics_events (id, event, actor_key, data, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    event,
                    actor_key,
                    data.to_string(),
                    fmt_ts(now),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_event: {e}")))?;
        Ok(())
    }

    async fn list_events(&self, event: &str) -> Result<Vec<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT data FROM analytics_events WHERE event = ?1 ORDER BY created_at ASC",
                params![event],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_events: {e}")))?;

        let mut events = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let raw: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("list_events: {e}")))?;
            events.push(
                serde_json::from_str(&raw)
                    .map_err(|e| DatabaseError::Serialization(format!("list_events: {e}")))?,
            );
        }
        Ok(events)
    }
}
