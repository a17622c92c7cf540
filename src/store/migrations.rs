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
        name: "identities_and_flags",
        // One row per mapping: both directions live in the same row, so the
        // pair is written or rejected as a whole.
        sql: r#"
            CREATE TABLE IF NOT EXISTS identities (
                address TEXT PRIMARY KEY,
                anon_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS flags (
                key TEXT PRIMARY KEY,
                expires_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_flags_expires ON flags(expires_at_ms);
        "#,
    },
    Migration {
        version: 2,
        name: "streams",
        sql: r#"
            CREATE TABLE IF NOT EXISTS stream_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stream TEXT NOT NULL,
                fields TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_stream_entries_stream ON stream_entries(stream, id);

            CREATE TABLE IF NOT EXISTS stream_groups (
                stream TEXT NOT NULL,
                group_name TEXT NOT NULL,
                start_after_id INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (stream, group_name)
            );

            -- A row per (group, entry) once delivered; acked_at stays NULL while pending.
            CREATE TABLE IF NOT EXISTS stream_deliveries (
                stream TEXT NOT NULL,
                group_name TEXT NOT NULL,
                entry_id INTEGER NOT NULL REFERENCES stream_entries(id) ON DELETE CASCADE,
                consumer TEXT NOT NULL,
                delivered_at TEXT NOT NULL,
                acked_at TEXT,
                PRIMARY KEY (stream, group_name, entry_id)
            );
            CREATE INDEX IF NOT EXISTS idx_stream_deliveries_consumer
                ON stream_deliveries(stream, group_name, consumer, acked_at);
        "#,
    },
    Migration {
        version: 3,
        name: "delivery_idle_time",
        // Rows from before this version read as long idle, which is accurate.
        sql: r#"
            ALTER TABLE stream_deliveries ADD COLUMN delivered_at_ms INTEGER NOT NULL DEFAULT 0;
            CREATE INDEX IF NOT EXISTS idx_stream_deliveries_idle
                ON stream_deliveries(stream, group_name, acked_at, delivered_at_ms);
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

    tracing::info!(
        "Database migrations complete (at V{})",
        get_current_version(conn).await?
    );

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
