//! Machine fingerprinting for node identity.
//!
//! A fingerprint is the lowercase hex SHA-256 of the host's identifying
//! facts, joined in a fixed order:
//!
//! `hostname | sorted non-loopback MACs | os | arch | machine-id`
//!
//! It survives restarts and changes when the hardware or hostname does.
//! Collecting the facts touches the host; computing the digest does not, so
//! [`compute_fingerprint`] is a pure function that tests can drive directly.
//!
//! In containers without stable MAC addresses, set a stable hostname or the
//! `WARDEN_FINGERPRINT` environment variable to override the fingerprint.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use sysinfo::Networks;

/// Environment variable that replaces fingerprint computation entirely.
pub const FINGERPRINT_ENV: &str = "WARDEN_FINGERPRINT";

/// The host facts a fingerprint is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    /// Hostname.
    pub hostname: String,
    /// Hardware addresses of non-loopback interfaces, any order.
    pub mac_addresses: Vec<String>,
    /// Operating system name.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// OS-level machine identifier, when the platform has one.
    pub machine_id: Option<String>,
}

impl HostFacts {
    /// Collects facts about the current host.
    ///
    /// Only the hostname is required; interface enumeration and the machine
    /// identifier are best effort.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Fingerprint`] if the hostname cannot be read.
    pub fn collect() -> LicenseResult<Self> {
        let hostname = local_hostname()
            .ok_or_else(|| LicenseError::Fingerprint("hostname unavailable".to_string()))?;
        Ok(Self {
            hostname,
            mac_addresses: mac_addresses(),
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            machine_id: machine_id(),
        })
    }
}

/// Digests host facts into a 64-character lowercase hex fingerprint.
#[must_use]
pub fn compute_fingerprint(facts: &HostFacts) -> String {
    let mut macs: Vec<&str> = facts
        .mac_addresses
        .iter()
        .map(String::as_str)
        .filter(|mac| !mac.is_empty())
        .collect();
    macs.sort_unstable();

    let mut parts: Vec<&str> = Vec::with_capacity(macs.len() + 4);
    parts.push(&facts.hostname);
    parts.extend(macs);
    parts.push(&facts.os);
    parts.push(&facts.arch);
    if let Some(machine_id) = facts.machine_id.as_deref() {
        parts.push(machine_id);
    }

    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

/// Collects host facts and digests them.
///
/// # Errors
///
/// Returns [`LicenseError::Fingerprint`] if the hostname cannot be read.
pub fn generate_fingerprint() -> LicenseResult<String> {
    HostFacts::collect().map(|facts| compute_fingerprint(&facts))
}

/// Returns `override_value` verbatim when non-empty, otherwise generates.
///
/// # Errors
///
/// Returns [`LicenseError::Fingerprint`] if generation is needed and fails.
pub fn resolve_fingerprint(override_value: Option<&str>) -> LicenseResult<String> {
    match override_value.filter(|fp| !fp.is_empty()) {
        Some(fp) => Ok(fp.to_string()),
        None => generate_fingerprint(),
    }
}

/// Reads the fingerprint override from [`FINGERPRINT_ENV`], if set and non-empty.
#[must_use]
pub fn fingerprint_override_from_env() -> Option<String> {
    env::var(FINGERPRINT_ENV).ok().filter(|fp| !fp.is_empty())
}

/// Gets the machine hostname.
pub(crate) fn local_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
}

/// Gets hardware addresses of non-loopback interfaces.
fn mac_addresses() -> Vec<String> {
    let networks = Networks::new_with_refreshed_list();
    networks
        .iter()
        .map(|(_, data)| data.mac_address().to_string())
        .filter(|mac| usable_mac(mac))
        .collect()
}

/// Loopback and virtual interfaces without hardware report an all-zero address.
fn usable_mac(mac: &str) -> bool {
    mac.split(':').any(|octet| !octet.trim_start_matches('0').is_empty())
}

/// Gets the machine ID (platform-specific unique identifier).
fn machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
