//! The storage-agnostic registry contract.

use crate::error::RegistryResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_types::CallContext;

/// A node announcing itself for a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRegistration {
    /// Machine fingerprint (unique key).
    pub fingerprint: String,
    /// Hostname.
    pub hostname: String,
    /// IP address, empty when unknown.
    pub ip: String,
    /// Operating system name.
    pub os: String,
    /// License the node counts against.
    pub license_key: String,
}

impl NodeRegistration {
    /// Creates a registration with empty host details.
    #[must_use]
    pub fn new(fingerprint: impl Into<String>, license_key: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            hostname: String::new(),
            ip: String::new(),
            os: String::new(),
            license_key: license_key.into(),
        }
    }
}

/// A node as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Machine fingerprint (unique key).
    pub fingerprint: String,
    /// Hostname.
    pub hostname: String,
    /// IP address.
    pub ip: String,
    /// Operating system name.
    pub os: String,
    /// License the node counts against.
    pub license_key: String,
    /// First registration time. Never changed by later upserts.
    pub registered_at: DateTime<Utc>,
    /// Last registration or ping.
    pub last_seen_at: DateTime<Utc>,
}

/// Tracks nodes per license for distributed enforcement.
///
/// Implementations must agree on every observable behavior listed on each
/// method; the contract test suite runs against all of them.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Short backend identifier for diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Creates or updates a node (atomic upsert by fingerprint).
    ///
    /// The first call sets `registered_at`; later calls keep it and overwrite
    /// every other field. Returns the record as stored.
    async fn register(&self, ctx: &CallContext, node: &NodeRegistration)
        -> RegistryResult<NodeRecord>;

    /// Removes a node. Removing an unknown fingerprint is not an error.
    async fn deregister(&self, ctx: &CallContext, fingerprint: &str) -> RegistryResult<()>;

    /// Counts nodes for a license key.
    async fn count(&self, ctx: &CallContext, license_key: &str) -> RegistryResult<u64>;

    /// Lists nodes for a license key, oldest registration first.
    async fn list(&self, ctx: &CallContext, license_key: &str) -> RegistryResult<Vec<NodeRecord>>;

    /// Refreshes `last_seen_at`. Unknown fingerprints are ignored.
    async fn ping(&self, ctx: &CallContext, fingerprint: &str) -> RegistryResult<()>;

    /// Removes nodes of a license not seen within `older_than`.
    /// Returns how many were removed.
    async fn prune(
        &self,
        ctx: &CallContext,
        license_key: &str,
        older_than: Duration,
    ) -> RegistryResult<u64>;

    /// Releases registry-owned resources. The storage handle supplied by the
    /// caller stays open.
    async fn close(&self) -> RegistryResult<()>;
}

/// Current time at the precision every backend can store.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// `now - older_than`, saturating at the Unix epoch.
pub(crate) fn stale_cutoff(now: DateTime<Utc>, older_than: Duration) -> DateTime<Utc> {
    ChronoDuration::from_std(older_than)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .map_or(DateTime::UNIX_EPOCH, |cutoff| cutoff.max(DateTime::UNIX_EPOCH))
}
