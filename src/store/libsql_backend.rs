//! libSQL backend — async `PolicyStore` implementation.
//!
//! Supports local file and in-memory databases. List-valued policy fields
//! are stored as JSON text; unset optional fields as `NULL`.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::policy::{VerificationPolicy, dedup_ordered};
use crate::store::traits::PolicyStore;

const POLICY_COLUMNS: &str = "guild_id, auto_verify, verification_channel_id, welcome_channel_id, \
     min_roles_required, intro_channel_ids, verification_phrase, roles_to_grant, \
     roles_to_revoke, welcome_template, updated_at";

/// libSQL policy store.
///
/// Holds a single connection reused for all operations.
pub struct LibSqlPolicyStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlPolicyStore {
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

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Policy database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str, column: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(raw)
        .map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
}

/// Map a libsql Row to a policy. Column order matches `POLICY_COLUMNS`.
fn row_to_policy(row: &libsql::Row) -> Result<VerificationPolicy, DatabaseError> {
    let query_err = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));

    let guild_id: String = row.get(0).map_err(query_err)?;
    let auto_verify: i64 = row.get(1).map_err(query_err)?;
    let verification_channel_id: Option<String> = row.get::<String>(2).ok();
    let welcome_channel_id: Option<String> = row.get::<String>(3).ok();
    let min_roles_required: i64 = row.get(4).map_err(query_err)?;
    let intro_raw: Option<String> = row.get::<String>(5).ok();
    let verification_phrase: Option<String> = row.get::<String>(6).ok();
    let grant_raw: String = row.get(7).map_err(query_err)?;
    let revoke_raw: String = row.get(8).map_err(query_err)?;
    let welcome_template: String = row.get(9).map_err(query_err)?;
    let updated_str: String = row.get(10).map_err(query_err)?;

    let intro_channel_ids = match intro_raw {
        Some(raw) => Some(dedup_ordered(from_json::<Vec<String>>(
            &raw,
            "intro_channel_ids",
        )?)),
        None => None,
    };

    Ok(VerificationPolicy {
        guild_id,
        auto_verify_enabled: auto_verify != 0,
        verification_channel_id,
        welcome_channel_id,
        min_roles_required: u32::try_from(min_roles_required).unwrap_or(0),
        intro_channel_ids,
        verification_phrase,
        roles_to_grant: from_json::<BTreeSet<String>>(&grant_raw, "roles_to_grant")?,
        roles_to_revoke: from_json::<BTreeSet<String>>(&revoke_raw, "roles_to_revoke")?,
        welcome_template,
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl PolicyStore for LibSqlPolicyStore {
    async fn get_policy(&self, guild_id: &str) -> Result<Option<VerificationPolicy>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {POLICY_COLUMNS} FROM verification_policies WHERE guild_id = ?1"),
                params![guild_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_policy: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_policy(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_policy: {e}"))),
        }
    }

    async fn put_policy(&self, policy: &VerificationPolicy) -> Result<(), DatabaseError> {
        let intro = policy
            .intro_channel_ids
            .as_ref()
            .map(|ids| to_json(&dedup_ordered(ids.iter().cloned())))
            .transpose()?;

        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO verification_policies ({POLICY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    policy.guild_id.as_str(),
                    policy.auto_verify_enabled as i64,
                    opt_text(policy.verification_channel_id.as_deref()),
                    opt_text(policy.welcome_channel_id.as_deref()),
                    i64::from(policy.min_roles_required),
                    opt_text(intro.as_deref()),
                    opt_text(policy.verification_phrase.as_deref()),
                    to_json(&policy.roles_to_grant)?,
                    to_json(&policy.roles_to_revoke)?,
                    policy.welcome_template.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_policy: {e}")))?;

        debug!(guild_id = %policy.guild_id, "Verification policy stored");
        Ok(())
    }

    async fn delete_policy(&self, guild_id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM verification_policies WHERE guild_id = ?1",
                params![guild_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_policy: {e}")))?;
        Ok(affected > 0)
    }
}
