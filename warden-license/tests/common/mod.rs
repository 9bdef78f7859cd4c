//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden_license::{CallContext, NodeRecord, NodeRegistration, NodeRegistry};
use warden_registry::{RegistryConfig, RegistryResult, SqliteRegistry};

/// Returns a deterministic Ed25519 key pair from a fixed seed.
pub fn test_keypair() -> (SigningKey, String) {
    keypair_from_seed(1)
}

/// A second, unrelated key pair.
pub fn other_keypair() -> (SigningKey, String) {
    keypair_from_seed(101)
}

fn keypair_from_seed(start: u8) -> (SigningKey, String) {
    let mut seed = [0u8; 32];
    for (i, b) in seed.iter_mut().enumerate() {
        *b = start.wrapping_add(i as u8);
    }
    let signing_key = SigningKey::from_bytes(&seed);
    let public_b64 = STANDARD.encode(signing_key.verifying_key().to_bytes());
    (signing_key, public_b64)
}

/// Builds a license file around `license_json`, signing its exact bytes.
///
/// `embedded_key` is written as `public_key` when given.
pub fn signed_file(signing_key: &SigningKey, license_json: &str, embedded_key: Option<&str>) -> String {
    let signature = STANDARD.encode(signing_key.sign(license_json.as_bytes()).to_bytes());
    match embedded_key {
        Some(key) => format!(
            r#"{{"license":{license_json},"signature":"{signature}","public_key":"{key}"}}"#
        ),
        None => format!(r#"{{"license":{license_json},"signature":"{signature}"}}"#),
    }
}

/// License payload with the given expiry (RFC 3339) and feature object.
pub fn license_json(license_key: &str, expires_at: &str, features: &str) -> String {
    format!(
        r#"{{"license_key":"{license_key}","company_id":"co-1","app_id":"app-1","plan":"enterprise","features":{features},"expires_at":"{expires_at}","issued_at":"2025-01-01T00:00:00Z"}}"#
    )
}

/// Expiry far in the future.
pub const FAR_FUTURE: &str = "2099-01-01T00:00:00Z";

/// Expiry in the past.
pub const LONG_AGO: &str = "2020-01-01T00:00:00Z";

/// A fresh in-memory SQLite registry.
pub async fn sqlite_registry() -> Arc<SqliteRegistry> {
    Arc::new(
        SqliteRegistry::open_in_memory(&CallContext::background(), RegistryConfig::default())
            .await
            .unwrap(),
    )
}

/// Registry wrapper that counts every call reaching the inner registry.
pub struct CountingRegistry {
    inner: Arc<dyn NodeRegistry>,
    calls: AtomicUsize,
}

impl CountingRegistry {
    pub fn new(inner: Arc<dyn NodeRegistry>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeRegistry for CountingRegistry {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn register(&self, ctx: &CallContext, node: &NodeRegistration) -> RegistryResult<NodeRecord> {
        self.hit();
        self.inner.register(ctx, node).await
    }

    async fn deregister(&self, ctx: &CallContext, fingerprint: &str) -> RegistryResult<()> {
        self.hit();
        self.inner.deregister(ctx, fingerprint).await
    }

    async fn count(&self, ctx: &CallContext, license_key: &str) -> RegistryResult<u64> {
        self.hit();
        self.inner.count(ctx, license_key).await
    }

    async fn list(&self, ctx: &CallContext, license_key: &str) -> RegistryResult<Vec<NodeRecord>> {
        self.hit();
        self.inner.list(ctx, license_key).await
    }

    async fn ping(&self, ctx: &CallContext, fingerprint: &str) -> RegistryResult<()> {
        self.hit();
        self.inner.ping(ctx, fingerprint).await
    }

    async fn prune(
        &self,
        ctx: &CallContext,
        license_key: &str,
        older_than: Duration,
    ) -> RegistryResult<u64> {
        self.hit();
        self.inner.prune(ctx, license_key, older_than).await
    }

    async fn close(&self) -> RegistryResult<()> {
        self.inner.close().await
    }
}
