//! Version-tracked database migrations for the libSQL policy store.
//!
//! Each pending migration runs in its own transaction together with its
//! `_migrations` record, so a failed step leaves the schema at the last
//! good version.

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
        name: "verification_policies",
        sql: r#"
            CREATE TABLE IF NOT EXISTS verification_policies (
                guild_id TEXT PRIMARY KEY,
                auto_verify INTEGER NOT NULL DEFAULT 0,
                verification_channel_id TEXT,
                welcome_channel_id TEXT,
                min_roles_required INTEGER NOT NULL DEFAULT 0,
                intro_channel_ids TEXT,
                verification_phrase TEXT,
                roles_to_grant TEXT NOT NULL DEFAULT '[]',
                roles_to_revoke TEXT NOT NULL DEFAULT '[]',
                welcome_template TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL
            );"#,
    },
    Migration {
        version: 2,
        name: "policy_verification_channel_index",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_policies_verification_channel
                ON verification_policies(verification_channel_id);"#,
    },
];

/// Create the migrations table and apply every pending migration.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("_migrations table: {e}")))?;

    let applied = schema_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Policy schema up to date");
        return Ok(());
    }

    for migration in pending {
        apply(conn, migration).await?;
    }
    let version = schema_version(conn).await?;
    tracing::info!(from = applied, to = version, "Policy schema migrated");
    Ok(())
}

/// Run one migration and record it atomically.
async fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: libsql::Error| {
        DatabaseError::Migration(format!("V{} {}: {e}", migration.version, migration.name))
    };
    tracing::info!(version = migration.version, name = migration.name, "Applying migration");

    let tx = conn.transaction().await.map_err(failed)?;
    tx.execute_batch(migration.sql).await.map_err(failed)?;
    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![migration.version, migration.name],
    )
    .await
    .map_err(failed)?;
    tx.commit().await.map_err(failed)
}

/// Highest recorded migration version; 0 on a fresh database.
async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Migration(format!("schema version: {e}"));
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(read)?;
    match rows.next().await.map_err(read)? {
        Some(row) => row.get::<i64>(0).map_err(read),
        None => Ok(0),
    }
}
