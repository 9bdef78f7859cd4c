//! Hardware limits carried in license features.
//!
//! Two feature keys are recognized: `max_cpu_per_node` and `max_nodes`.
//! A limit of 0 means unlimited.

use crate::error::{LicenseError, LicenseResult};
use crate::types::Features;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

/// Feature key for the per-node CPU limit.
pub const MAX_CPU_PER_NODE: &str = "max_cpu_per_node";
/// Feature key for the node-count limit.
pub const MAX_NODES: &str = "max_nodes";

/// Hardware constraints extracted from a license's features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareLimits {
    /// Maximum logical CPUs per node (0 = unlimited).
    pub max_cpu_per_node: u64,
    /// Maximum concurrently registered nodes (0 = unlimited).
    pub max_nodes: u64,
}

/// Extracts hardware limits from a feature map. Never fails.
///
/// Integer and floating-point values are accepted; floats are truncated
/// toward zero. Any other type, a negative value, or an absent key yields 0.
#[must_use]
pub fn extract_hardware_limits(features: &Features) -> HardwareLimits {
    HardwareLimits {
        max_cpu_per_node: features.get(MAX_CPU_PER_NODE).map_or(0, limit_value),
        max_nodes: features.get(MAX_NODES).map_or(0, limit_value),
    }
}

fn limit_value(value: &Value) -> u64 {
    let Value::Number(n) = value else {
        return 0;
    };
    if let Some(u) = n.as_u64() {
        return u;
    }
    match n.as_f64() {
        // Saturating cast truncates toward zero; negatives and NaN become 0.
        Some(f) if f > 0.0 => f as u64,
        _ => 0,
    }
}

/// Checks the live host's logical CPU count against the limit.
///
/// # Errors
///
/// Returns [`LicenseError::CpuLimitExceeded`] when the host has more CPUs
/// than allowed.
pub fn check_cpu(limits: &HardwareLimits) -> LicenseResult<()> {
    check_cpu_count(limits, logical_cpus())
}

/// Checks a CPU count against the limit. Equal to the limit is allowed.
///
/// # Errors
///
/// Returns [`LicenseError::CpuLimitExceeded`] when `cpus` exceeds the limit.
pub fn check_cpu_count(limits: &HardwareLimits, cpus: u64) -> LicenseResult<()> {
    let limit = limits.max_cpu_per_node;
    if limit > 0 && cpus > limit {
        return Err(LicenseError::CpuLimitExceeded { cpus, limit });
    }
    Ok(())
}

/// Checks a node count against the limit. Equal to the limit is allowed.
///
/// # Errors
///
/// Returns [`LicenseError::NodeLimitExceeded`] when `nodes` exceeds the limit.
pub fn check_node_count(limits: &HardwareLimits, nodes: u64) -> LicenseResult<()> {
    let limit = limits.max_nodes;
    if limit > 0 && nodes > limit {
        return Err(LicenseError::NodeLimitExceeded { nodes, limit });
    }
    Ok(())
}

/// Logical CPUs on this host.
///
/// Counts every CPU the OS reports, ignoring cgroup quotas and affinity
/// masks, so a container cannot under-report the host it runs on.
#[must_use]
pub fn logical_cpus() -> u64 {
    let system = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
    match system.cpus().len() {
        0 => std::thread::available_parallelism().map_or(1, |n| n.get() as u64),
        n => n as u64,
    }
}
