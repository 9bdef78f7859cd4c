//! Orchestration of validation, hardware checks and node registration.
//!
//! [`Manager`] combines the online client, the offline validator and an
//! optional node registry into single operations. Each component is
//! optional; an operation that needs a missing one fails with
//! [`LicenseError::Config`].
//!
//! ```text
//! resolve fingerprint → validate → check CPU → register → count → check nodes
//!                                                                   │
//!                                             over limit: deregister ┘
//! ```

use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::{fingerprint_override_from_env, local_hostname, resolve_fingerprint};
use crate::hardware::{check_cpu, check_node_count, extract_hardware_limits};
use crate::offline::OfflineValidator;
use crate::types::{Features, LicenseInfo, OfflineLicenseData};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use warden_registry::{NodeRecord, NodeRegistration, NodeRegistry};
use warden_types::CallContext;

#[cfg(feature = "online")]
use crate::client::OnlineClient;
#[cfg(feature = "online")]
use crate::types::{ActivateRequest, ActivationRecord, ValidateRequest};

/// Builder for [`Manager`].
#[derive(Default)]
pub struct ManagerBuilder {
    #[cfg(feature = "online")]
    client: Option<OnlineClient>,
    offline: Option<OfflineValidator>,
    registry: Option<Arc<dyn NodeRegistry>>,
    fingerprint_override: Option<String>,
}

impl ManagerBuilder {
    /// Sets the license server client.
    #[cfg(feature = "online")]
    #[must_use]
    pub fn online_client(mut self, client: OnlineClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the offline license validator.
    #[must_use]
    pub fn offline_validator(mut self, validator: OfflineValidator) -> Self {
        self.offline = Some(validator);
        self
    }

    /// Enables distributed node tracking.
    #[must_use]
    pub fn node_registry(mut self, registry: Arc<dyn NodeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Pins this node's fingerprint instead of computing it.
    #[must_use]
    pub fn fingerprint_override(mut self, fingerprint: impl Into<String>) -> Self {
        let fingerprint: String = fingerprint.into();
        self.fingerprint_override = (!fingerprint.is_empty()).then_some(fingerprint);
        self
    }

    /// Takes the fingerprint override from `WARDEN_FINGERPRINT`, if set.
    ///
    /// An unset or empty variable leaves the current override untouched.
    #[must_use]
    pub fn fingerprint_override_from_env(mut self) -> Self {
        if let Some(fp) = fingerprint_override_from_env() {
            self.fingerprint_override = Some(fp);
        }
        self
    }

    /// Builds the manager.
    #[must_use]
    pub fn build(self) -> Manager {
        Manager {
            #[cfg(feature = "online")]
            client: self.client,
            offline: self.offline,
            registry: self.registry,
            fingerprint_override: self.fingerprint_override,
        }
    }
}

/// Validates licenses and enforces their hardware limits on this node.
pub struct Manager {
    #[cfg(feature = "online")]
    client: Option<OnlineClient>,
    offline: Option<OfflineValidator>,
    registry: Option<Arc<dyn NodeRegistry>>,
    fingerprint_override: Option<String>,
}

impl Manager {
    /// Starts building a manager.
    #[must_use]
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    /// Returns true if a node registry is configured.
    #[must_use]
    pub fn has_registry(&self) -> bool {
        self.registry.is_some()
    }

    /// Resolves this node's fingerprint.
    ///
    /// The client's configured fingerprint wins, then the builder override,
    /// then a fingerprint computed from the host.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Fingerprint`] if the fingerprint has to be
    /// computed and the host facts cannot be read.
    pub fn fingerprint(&self) -> LicenseResult<String> {
        #[cfg(feature = "online")]
        if let Some(fp) = self.client.as_ref().and_then(OnlineClient::fingerprint) {
            return Ok(fp.to_string());
        }
        resolve_fingerprint(self.fingerprint_override.as_deref())
    }

    /// Validates a license online and enforces its hardware limits.
    ///
    /// An invalid license is returned as `valid: false` without touching the
    /// hardware checks or the registry. If registering this node pushes the
    /// license over its node limit, the registration is rolled back before
    /// [`LicenseError::NodeLimitExceeded`] is returned.
    ///
    /// # Errors
    ///
    /// Returns server and transport errors from validation unchanged, the
    /// limit errors, registry errors tagged with their stage, and
    /// [`LicenseError::Config`] without an online client.
    #[cfg(feature = "online")]
    pub async fn validate_and_enforce(
        &self,
        ctx: &CallContext,
        license_key: &str,
    ) -> LicenseResult<LicenseInfo> {
        let client = self.require_client("validate_and_enforce")?;
        let fingerprint = self.fingerprint()?;

        let result = client
            .validate(ctx, ValidateRequest::new(license_key).fingerprint(&fingerprint))
            .await?;
        if !result.valid {
            info!(
                license_key,
                reason = result.reason.as_deref().unwrap_or(""),
                "license reported invalid"
            );
            return Ok(LicenseInfo::invalid(license_key, fingerprint));
        }
        debug!(license_key, plan = result.plan.as_deref().unwrap_or(""), "license valid");

        let node_count = self
            .enforce(ctx, license_key, &fingerprint, &result.features)
            .await?;

        Ok(LicenseInfo {
            valid: true,
            license_key: license_key.to_string(),
            plan: result.plan,
            features: result.features,
            expires_at: result.expires_at,
            fingerprint,
            node_count,
        })
    }

    /// Activates this machine with the license server, then registers it.
    ///
    /// A registry failure is returned as is; the server-side activation is
    /// not undone.
    ///
    /// # Errors
    ///
    /// Returns activation errors (e.g. [`LicenseError::ActivationLimit`]),
    /// registry errors tagged "register node", and [`LicenseError::Config`]
    /// without an online client.
    #[cfg(feature = "online")]
    pub async fn activate_node(
        &self,
        ctx: &CallContext,
        license_key: &str,
    ) -> LicenseResult<ActivationRecord> {
        let client = self.require_client("activate_node")?;
        let fingerprint = self.fingerprint()?;

        let activation = client
            .activate(
                ctx,
                ActivateRequest {
                    license_key: license_key.to_string(),
                    fingerprint: fingerprint.clone(),
                    hostname: local_hostname().unwrap_or_default(),
                    ip: None,
                    os: Some(std::env::consts::OS.to_string()),
                },
            )
            .await?;
        info!(license_key, activation_id = %activation.id, "node activated");

        if let Some(registry) = &self.registry {
            registry
                .register(ctx, &registration(license_key, &fingerprint))
                .await
                .map_err(LicenseError::registry("register node"))?;
        }
        Ok(activation)
    }

    /// Verifies a signed offline license.
    ///
    /// # Errors
    ///
    /// Returns the offline verification errors, or [`LicenseError::Config`]
    /// without an offline validator.
    pub fn verify_offline(&self, raw: &[u8]) -> LicenseResult<OfflineLicenseData> {
        self.require_offline()?.verify(raw)
    }

    /// Reads and verifies a signed offline license file.
    ///
    /// # Errors
    ///
    /// Same as [`Manager::verify_offline`], plus [`LicenseError::ReadFile`].
    pub fn verify_offline_file(&self, path: impl AsRef<Path>) -> LicenseResult<OfflineLicenseData> {
        self.require_offline()?.verify_file(path)
    }

    /// Verifies a signed offline license and enforces its hardware limits.
    ///
    /// Runs the same CPU and node checks as
    /// [`Manager::validate_and_enforce`], for air-gapped clusters that share
    /// a registry.
    ///
    /// # Errors
    ///
    /// Returns the offline verification errors (an expired file carries its
    /// payload, see [`LicenseError::expired_license`]), the limit errors,
    /// and registry errors tagged with their stage.
    pub async fn enforce_offline(&self, ctx: &CallContext, raw: &[u8]) -> LicenseResult<LicenseInfo> {
        let data = self.verify_offline(raw)?;
        let fingerprint = self.fingerprint()?;

        let node_count = self
            .enforce(ctx, &data.license_key, &fingerprint, &data.features)
            .await?;

        Ok(LicenseInfo {
            valid: true,
            plan: Some(data.plan).filter(|p| !p.is_empty()),
            license_key: data.license_key,
            features: data.features,
            expires_at: data.expires_at,
            fingerprint,
            node_count,
        })
    }

    /// Refreshes this node's `last_seen_at`. No-op without a registry.
    ///
    /// # Errors
    ///
    /// Returns registry errors tagged "ping node".
    pub async fn heartbeat(&self, ctx: &CallContext) -> LicenseResult<()> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };
        let fingerprint = self.fingerprint()?;
        registry
            .ping(ctx, &fingerprint)
            .await
            .map_err(LicenseError::registry("ping node"))
    }

    /// Removes nodes of a license not seen within `older_than`.
    ///
    /// # Errors
    ///
    /// Returns registry errors tagged "prune nodes", and
    /// [`LicenseError::Config`] without a registry.
    pub async fn prune_stale(
        &self,
        ctx: &CallContext,
        license_key: &str,
        older_than: Duration,
    ) -> LicenseResult<u64> {
        self.require_registry("prune_stale")?
            .prune(ctx, license_key, older_than)
            .await
            .map_err(LicenseError::registry("prune nodes"))
    }

    /// Lists the nodes registered for a license, oldest first.
    ///
    /// # Errors
    ///
    /// Returns registry errors tagged "list nodes", and
    /// [`LicenseError::Config`] without a registry.
    pub async fn nodes(&self, ctx: &CallContext, license_key: &str) -> LicenseResult<Vec<NodeRecord>> {
        self.require_registry("nodes")?
            .list(ctx, license_key)
            .await
            .map_err(LicenseError::registry("list nodes"))
    }

    /// Deregisters this node for a graceful exit. No-op without a registry.
    ///
    /// # Errors
    ///
    /// Returns registry errors tagged "deregister node".
    pub async fn shutdown(&self, ctx: &CallContext) -> LicenseResult<()> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };
        let fingerprint = self.fingerprint()?;
        registry
            .deregister(ctx, &fingerprint)
            .await
            .map_err(LicenseError::registry("deregister node"))?;
        info!(%fingerprint, "node deregistered");
        Ok(())
    }

    /// CPU check, then registration and the node-count check when a
    /// registry is configured. Returns the node count it observed.
    async fn enforce(
        &self,
        ctx: &CallContext,
        license_key: &str,
        fingerprint: &str,
        features: &Features,
    ) -> LicenseResult<Option<u64>> {
        let limits = extract_hardware_limits(features);
        check_cpu(&limits)?;

        let Some(registry) = &self.registry else {
            return Ok(None);
        };

        registry
            .register(ctx, &registration(license_key, fingerprint))
            .await
            .map_err(LicenseError::registry("register node"))?;
        let count = registry
            .count(ctx, license_key)
            .await
            .map_err(LicenseError::registry("count nodes"))?;

        if let Err(err) = check_node_count(&limits, count) {
            warn!(license_key, count, limit = limits.max_nodes, "node limit exceeded, rolling back");
            if let Err(rollback) = registry.deregister(ctx, fingerprint).await {
                warn!(%fingerprint, error = %rollback, "failed to deregister node after limit check");
            }
            return Err(err);
        }

        debug!(license_key, count, "node registered");
        Ok(Some(count))
    }

    #[cfg(feature = "online")]
    fn require_client(&self, op: &str) -> LicenseResult<&OnlineClient> {
        self.client
            .as_ref()
            .ok_or_else(|| LicenseError::Config(format!("online client is required for {op}")))
    }

    fn require_offline(&self) -> LicenseResult<&OfflineValidator> {
        self.offline
            .as_ref()
            .ok_or_else(|| LicenseError::Config("offline validator is not configured".to_string()))
    }

    fn require_registry(&self, op: &str) -> LicenseResult<&Arc<dyn NodeRegistry>> {
        self.registry
            .as_ref()
            .ok_or_else(|| LicenseError::Config(format!("node registry is required for {op}")))
    }
}

fn registration(license_key: &str, fingerprint: &str) -> NodeRegistration {
    NodeRegistration {
        hostname: local_hostname().unwrap_or_default(),
        os: std::env::consts::OS.to_string(),
        ..NodeRegistration::new(fingerprint, license_key)
    }
}
