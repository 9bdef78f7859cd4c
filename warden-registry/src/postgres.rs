//! PostgreSQL-backed node registry.
//!
//! The caller connects (and drives the connection task); the registry only
//! borrows the shared [`Client`].

use crate::config::{validate_table_name, RegistryConfig};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::{now, stale_cutoff, NodeRecord, NodeRegistration, NodeRegistry};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::{Client, Row};
use tracing::{debug, info};
use warden_types::CallContext;

/// Node registry persisted in a PostgreSQL table.
pub struct PostgresRegistry {
    client: Arc<Client>,
    table: String,
}

fn record_from_row(row: &Row) -> RegistryResult<NodeRecord> {
    let decode = |e: tokio_postgres::Error| RegistryError::InvalidData(e.to_string());
    Ok(NodeRecord {
        fingerprint: row.try_get(0).map_err(decode)?,
        hostname: row.try_get(1).map_err(decode)?,
        ip: row.try_get(2).map_err(decode)?,
        os: row.try_get(3).map_err(decode)?,
        license_key: row.try_get(4).map_err(decode)?,
        registered_at: row.try_get(5).map_err(decode)?,
        last_seen_at: row.try_get(6).map_err(decode)?,
    })
}

impl PostgresRegistry {
    /// Creates a registry on an already-connected client.
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
        client: Arc<Client>,
        config: RegistryConfig,
    ) -> RegistryResult<Self> {
        validate_table_name(&config.table_name)?;
        let registry = Self {
            client,
            table: config.table_name,
        };
        registry.ensure_schema(ctx).await?;
        info!(table = %registry.table, "PostgreSQL node registry ready");
        Ok(registry)
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
                fingerprint   TEXT PRIMARY KEY,
                hostname      TEXT NOT NULL DEFAULT '',
                ip            TEXT NOT NULL DEFAULT '',
                os            TEXT NOT NULL DEFAULT '',
                license_key   TEXT NOT NULL,
                registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_seen_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_{t}_license_key_last_seen
                ON {t} (license_key, last_seen_at);
            ",
            t = self.table
        );
        bounded(ctx, "create table", self.client.batch_execute(&sql)).await
    }
}

/// Awaits a query under `ctx`, tagging failures with `op`.
async fn bounded<T, F>(ctx: &CallContext, op: &'static str, query: F) -> RegistryResult<T>
where
    F: Future<Output = Result<T, tokio_postgres::Error>>,
{
    ctx.run(query)
        .await
        .map_err(RegistryError::interrupted_during(op))?
        .map_err(|e| RegistryError::storage(op)(e.to_string()))
}

#[async_trait]
impl NodeRegistry for PostgresRegistry {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn register(
        &self,
        ctx: &CallContext,
        node: &NodeRegistration,
    ) -> RegistryResult<NodeRecord> {
        let sql = format!(
            "
            INSERT INTO {t} (fingerprint, hostname, ip, os, license_key, registered_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (fingerprint) DO UPDATE SET
                hostname = EXCLUDED.hostname,
                ip = EXCLUDED.ip,
                os = EXCLUDED.os,
                license_key = EXCLUDED.license_key,
                last_seen_at = EXCLUDED.last_seen_at
            RETURNING fingerprint, hostname, ip, os, license_key, registered_at, last_seen_at
            ",
            t = self.table
        );
        let seen = now();
        let row = bounded(
            ctx,
            "register node",
            self.client.query_one(
                &sql,
                &[
                    &node.fingerprint,
                    &node.hostname,
                    &node.ip,
                    &node.os,
                    &node.license_key,
                    &seen,
                ],
            ),
        )
        .await?;
        let record = record_from_row(&row)?;
        debug!(fingerprint = %record.fingerprint, "registered node");
        Ok(record)
    }

    async fn deregister(&self, ctx: &CallContext, fingerprint: &str) -> RegistryResult<()> {
        let sql = format!("DELETE FROM {} WHERE fingerprint = $1", self.table);
        bounded(
            ctx,
            "deregister node",
            self.client.execute(&sql, &[&fingerprint]),
        )
        .await?;
        Ok(())
    }

    async fn count(&self, ctx: &CallContext, license_key: &str) -> RegistryResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE license_key = $1", self.table);
        let row = bounded(
            ctx,
            "count nodes",
            self.client.query_one(&sql, &[&license_key]),
        )
        .await?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| RegistryError::InvalidData(e.to_string()))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn list(&self, ctx: &CallContext, license_key: &str) -> RegistryResult<Vec<NodeRecord>> {
        let sql = format!(
            "
            SELECT fingerprint, hostname, ip, os, license_key, registered_at, last_seen_at
            FROM {} WHERE license_key = $1
            ORDER BY registered_at ASC, fingerprint ASC
            ",
            self.table
        );
        let rows = bounded(ctx, "list nodes", self.client.query(&sql, &[&license_key])).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn ping(&self, ctx: &CallContext, fingerprint: &str) -> RegistryResult<()> {
        let sql = format!(
            "UPDATE {} SET last_seen_at = $1 WHERE fingerprint = $2",
            self.table
        );
        let seen = now();
        bounded(
            ctx,
            "ping node",
            self.client.execute(&sql, &[&seen, &fingerprint]),
        )
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
            "DELETE FROM {} WHERE license_key = $1 AND last_seen_at < $2",
            self.table
        );
        let cutoff = stale_cutoff(now(), older_than);
        let removed = bounded(
            ctx,
            "prune nodes",
            self.client.execute(&sql, &[&license_key, &cutoff]),
        )
        .await?;
        if removed > 0 {
            info!(removed, "pruned stale nodes");
        }
        Ok(removed)
    }

    async fn close(&self) -> RegistryResult<()> {
        // The client and its connection task belong to the caller.
        Ok(())
    }
}
