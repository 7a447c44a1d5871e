//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "task_engine",
        sql: r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                actor_key TEXT NOT NULL,
                actor_role TEXT NOT NULL,
                task_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',
                step TEXT NOT NULL,
                step_data TEXT NOT NULL,
                last_activity_at TEXT NOT NULL,
                reminder_sent INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_one_running
                ON tasks(actor_key, actor_role) WHERE status = 'running';
            CREATE INDEX IF NOT EXISTS idx_tasks_status_activity
                ON tasks(status, last_activity_at);

            CREATE TABLE IF NOT EXISTS abandoned_tasks (
                actor_key TEXT NOT NULL,
                actor_role TEXT NOT NULL,
                task_type TEXT NOT NULL,
                step TEXT NOT NULL,
                step_data TEXT NOT NULL,
                abandoned_at TEXT NOT NULL,
                PRIMARY KEY (actor_key, task_type)
            );

            CREATE TABLE IF NOT EXISTS actors (
                actor_key TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                name TEXT NOT NULL,
                email TEXT,
                business_name TEXT,
                profile_complete INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS edges (
                initiator_key TEXT NOT NULL,
                target_key TEXT NOT NULL,
                connection_status TEXT NOT NULL,
                invited_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (initiator_key, target_key)
            );
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_key, connection_status);

            CREATE TABLE IF NOT EXISTS invitations (
                token TEXT PRIMARY KEY,
                from_key TEXT NOT NULL,
                to_contact TEXT NOT NULL,
                status TEXT NOT NULL,
                completion_mode TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                responded_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_invitations_status ON invitations(status, expires_at);
            CREATE INDEX IF NOT EXISTS idx_invitations_to ON invitations(to_contact);
        "#,
    },
    Migration {
        version: 2,
        name: "habit_logs_and_analytics",
        sql: r#"
            CREATE TABLE IF NOT EXISTS habit_logs (
                id TEXT PRIMARY KEY,
                actor_key TEXT NOT NULL,
                habit TEXT NOT NULL,
                value REAL NOT NULL,
                logged_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_habit_logs_actor ON habit_logs(actor_key);

            CREATE TABLE IF NOT EXISTS analytics_events (
                id TEXT PRIMARY KEY,
                event TEXT NOT NULL,
                actor_key TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analytics_event ON analytics_events(event);
        "#,
    },
    Migration {
        version: 3,
        name: "edges_unordered_pair",
        sql: r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_pair
                ON edges(min(initiator_key, target_key), max(initiator_key, target_key));
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
