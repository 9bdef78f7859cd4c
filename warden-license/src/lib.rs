//! License validation and node enforcement for Warden.
//!
//! This crate handles:
//! - Online validation and activation against the license server
//! - Offline verification of Ed25519-signed license files
//! - Machine fingerprinting for node identity
//! - Hardware limits (CPUs per node, nodes per license)
//! - Cluster-wide node counting through a [`NodeRegistry`]
//!
//! # Design Principles
//!
//! - **No hidden work**: every operation is a single awaited call; nothing
//!   runs in the background
//! - **Bounded I/O**: every network request and storage query takes a
//!   [`CallContext`] for cancellation and deadlines
//! - **Inspectable errors**: every failure has an [`ErrorKind`]; server
//!   failures also keep the raw [`ServerError`]
//!
//! # Offline License Format
//!
//! `{"license": {...}, "signature": "<base64>", "public_key": "<base64>"}`
//! with the Ed25519 signature taken over the raw bytes of `license`.

mod error;
mod error_map;
mod fingerprint;
mod hardware;
mod manager;
mod offline;
mod types;

#[cfg(feature = "online")]
mod client;

pub use error::{ErrorKind, LicenseError, LicenseResult, ServerError};
pub use error_map::{map_server_error, parse_error_response, UNKNOWN_CODE};
pub use fingerprint::{
    compute_fingerprint, fingerprint_override_from_env, generate_fingerprint, resolve_fingerprint,
    HostFacts, FINGERPRINT_ENV,
};
pub use hardware::{
    check_cpu, check_cpu_count, check_node_count, extract_hardware_limits, logical_cpus,
    HardwareLimits, MAX_CPU_PER_NODE, MAX_NODES,
};
pub use manager::{Manager, ManagerBuilder};
pub use offline::{OfflineConfig, OfflineValidator};
pub use types::{
    ActivateRequest, ActivationRecord, Features, LicenseInfo, OfflineLicenseData,
    ValidateRequest, ValidateResult,
};

#[cfg(feature = "online")]
pub use client::{ClientConfig, OnlineClient, MAX_RESPONSE_BYTES};

pub use warden_registry::{NodeRecord, NodeRegistration, NodeRegistry};
pub use warden_types::{CallContext, CancelHandle, Interrupted};
