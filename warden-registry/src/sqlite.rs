//! SQLite-backed node registry.
//!
//! The caller owns the [`Connection`]; it is shared behind an
//! `Arc<Mutex<_>>` so several registries (or unrelated application code) can
//! use the same database. Queries run on the blocking pool. Timestamps are
//! stored as integer microseconds since the Unix epoch.

use crate::config::{validate_table_name, RegistryConfig};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::{now, stale_cutoff, NodeRecord, NodeRegistration, NodeRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use warden_types::CallContext;

/// Node registry persisted in a SQLite table.
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

/// Row as read from SQLite, before timestamp decoding.
struct RawNode {
    fingerprint: String,
    hostname: String,
    ip: String,
    os: String,
    license_key: String,
    registered_at: i64,
    last_seen_at: i64,
}

impl RawNode {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fingerprint: row.get(0)?,
            hostname: row.get(1)?,
            ip: row.get(2)?,
            os: row.get(3)?,
            license_key: row.get(4)?,
            registered_at: row.get(5)?,
            last_seen_at: row.get(6)?,
        })
    }

    fn into_record(self) -> RegistryResult<NodeRecord> {
        Ok(NodeRecord {
            registered_at: from_micros(self.registered_at)?,
            last_seen_at: from_micros(self.last_seen_at)?,
            fingerprint: self.fingerprint,
            hostname: self.hostname,
            ip: self.ip,
            os: self.os,
            license_key: self.license_key,
        })
    }
}

fn from_micros(micros: i64) -> RegistryResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| RegistryError::InvalidData(format!("timestamp out of range: {micros}")))
}

impl SqliteRegistry {
    /// Creates a registry on an already-open connection.
    ///
    /// Validates the table name, then creates the table and its
    /// `(license_key, last_seen_at)` index if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidTableName`] before touching the
    /// database, or a storage error if the schema cannot be created.
    pub async fn new(
        ctx: &CallContext,
        conn: Arc<Mutex<Connection>>,
        config: RegistryConfig,
    ) -> RegistryResult<Self> {
        validate_table_name(&config.table_name)?;
        let registry = Self {
            conn,
            table: config.table_name,
        };
        registry.ensure_schema(ctx).await?;
        info!(table = %registry.table, "SQLite node registry ready");
        Ok(registry)
    }

    /// Opens a private in-memory database (for testing and single-process use).
    ///
    /// # Errors
    ///
    /// Returns a storage error if SQLite cannot open the database.
    pub async fn open_in_memory(ctx: &CallContext, config: RegistryConfig) -> RegistryResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RegistryError::Storage {
                op: "open database",
                message: e.to_string(),
            })?;
        Self::new(ctx, Arc::new(Mutex::new(conn)), config).await
    }

    /// Returns the table this registry writes to.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    async fn ensure_schema(&self, ctx: &CallContext) -> RegistryResult<()> {
        let sql = format!(
            "
            CREATE TABLE IF NOT EXISTS {t} (
                fingerprint   TEXT PRIMARY KEY NOT NULL,
                hostname      TEXT NOT NULL DEFAULT '',
                ip            TEXT NOT NULL DEFAULT '',
                os            TEXT NOT NULL DEFAULT '',
                license_key   TEXT NOT NULL,
                registered_at INTEGER NOT NULL,
                last_seen_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{t}_license_key_last_seen
                ON {t} (license_key, last_seen_at);
            ",
            t = self.table
        );
        self.with_conn(ctx, "create table", move |conn| conn.execute_batch(&sql))
            .await
    }

    /// Runs `f` against the shared connection on the blocking pool, bounded by
    /// `ctx`. An interrupted call is abandoned; the statement finishes in the
    /// background and its result is discarded.
    async fn with_conn<T, F>(&self, ctx: &CallContext, op: &'static str, f: F) -> RegistryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || -> Result<T, String> {
            let guard = conn
                .lock()
                .map_err(|_| "connection lock poisoned".to_string())?;
            f(&guard).map_err(|e| e.to_string())
        });

        match ctx.run(task).await {
            Ok(Ok(result)) => result.map_err(RegistryError::storage(op)),
            Ok(Err(join_err)) => Err(RegistryError::Storage {
                op,
                message: format!("blocking task failed: {join_err}"),
            }),
            Err(interrupted) => Err(RegistryError::interrupted_during(op)(interrupted)),
        }
    }
}

#[async_trait]
impl NodeRegistry for SqliteRegistry {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn register(
        &self,
        ctx: &CallContext,
        node: &NodeRegistration,
    ) -> RegistryResult<NodeRecord> {
        let sql = format!(
            "
            INSERT INTO {t} (fingerprint, hostname, ip, os, license_key, registered_at, last_seen_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT (fingerprint) DO UPDATE SET
                hostname = excluded.hostname,
                ip = excluded.ip,
                os = excluded.os,
                license_key = excluded.license_key,
                last_seen_at = excluded.last_seen_at
            RETURNING fingerprint, hostname, ip, os, license_key, registered_at, last_seen_at
            ",
            t = self.table
        );
        let node = node.clone();
        let seen = now().timestamp_micros();

        let raw = self
            .with_conn(ctx, "register node", move |conn| {
                conn.query_row(
                    &sql,
                    params![
                        node.fingerprint,
                        node.hostname,
                        node.ip,
                        node.os,
                        node.license_key,
                        seen
                    ],
                    RawNode::from_row,
                )
            })
            .await?;
        let record = raw.into_record()?;
        debug!(fingerprint = %record.fingerprint, "registered node");
        Ok(record)
    }

    async fn deregister(&self, ctx: &CallContext, fingerprint: &str) -> RegistryResult<()> {
        let sql = format!("DELETE FROM {} WHERE fingerprint = ?1", self.table);
        let fingerprint = fingerprint.to_string();
        self.with_conn(ctx, "deregister node", move |conn| {
            conn.execute(&sql, params![fingerprint])
        })
        .await?;
        Ok(())
    }

    async fn count(&self, ctx: &CallContext, license_key: &str) -> RegistryResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE license_key = ?1", self.table);
        let license_key = license_key.to_string();
        let count: i64 = self
            .with_conn(ctx, "count nodes", move |conn| {
                conn.query_row(&sql, params![license_key], |row| row.get(0))
            })
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn list(&self, ctx: &CallContext, license_key: &str) -> RegistryResult<Vec<NodeRecord>> {
        let sql = format!(
            "
            SELECT fingerprint, hostname, ip, os, license_key, registered_at, last_seen_at
            FROM {} WHERE license_key = ?1
            ORDER BY registered_at ASC, fingerprint ASC
            ",
            self.table
        );
        let license_key = license_key.to_string();
        let rows = self
            .with_conn(ctx, "list nodes", move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![license_key], RawNode::from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        rows.into_iter().map(RawNode::into_record).collect()
    }

    async fn ping(&self, ctx: &CallContext, fingerprint: &str) -> RegistryResult<()> {
        let sql = format!(
            "UPDATE {} SET last_seen_at = ?1 WHERE fingerprint = ?2",
            self.table
        );
        let fingerprint = fingerprint.to_string();
        let seen = now().timestamp_micros();
        self.with_conn(ctx, "ping node", move |conn| {
            conn.execute(&sql, params![seen, fingerprint])
        })
        .await?;
        Ok(())
    }

    async fn prune(
        &self,
        ctx: &CallContext,
        license_key: &str,
        older_than: Duration,
    ) -> RegistryResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE license_key = ?1 AND last_seen_at < ?2",
            self.table
        );
        let license_key = license_key.to_string();
        let cutoff = stale_cutoff(now(), older_than).timestamp_micros();
        let removed = self
            .with_conn(ctx, "prune nodes", move |conn| {
                conn.execute(&sql, params![license_key, cutoff])
            })
            .await?;
        let removed = removed as u64;
        if removed > 0 {
            info!(removed, "pruned stale nodes");
        }
        Ok(removed)
    }

    async fn close(&self) -> RegistryResult<()> {
        // The connection belongs to the caller.
        Ok(())
    }
}
