//! Error types for license validation and enforcement.
//!
//! Every failure maps to one [`ErrorKind`]. Errors that came from the
//! license server additionally keep the raw [`ServerError`], so a caller can
//! both switch on the kind and log what the server actually said.

use crate::types::OfflineLicenseData;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use warden_registry::RegistryError;
use warden_types::Interrupted;

/// An error response from the license server.
///
/// The server returns errors as `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// HTTP status code.
    pub status: u16,
    /// Machine-readable error code (e.g. `NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server error {}: [{}] {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ServerError {}

/// Semantic category of a [`LicenseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    LicenseNotFound,
    LicenseInactive,
    LicenseExpired,
    ActivationLimit,
    SignatureInvalid,
    PublicKeyInvalid,
    LicenseFileInvalid,
    CpuLimitExceeded,
    NodeLimitExceeded,
    /// Unmapped server error; see [`LicenseError::server_error`].
    Server,
    /// Network failure or undecodable response. Never a license decision.
    Transport,
    Registry,
    Fingerprint,
    Io,
    Config,
    Cancelled,
    DeadlineExceeded,
}

/// Licensing errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The server does not know the license key.
    #[error("license not found")]
    NotFound(ServerError),

    /// The license exists but is suspended, revoked, or otherwise inactive.
    #[error("license is not active")]
    Inactive(ServerError),

    /// The license is past its expiration.
    ///
    /// Offline verification still returns the parsed license here so callers
    /// can inspect plan and features of an expired file.
    #[error("license expired")]
    Expired {
        /// Server response, when the server reported the expiry.
        server: Option<ServerError>,
        /// Verified offline payload, when a signed file reported the expiry.
        license: Option<Box<OfflineLicenseData>>,
    },

    /// The license has no activation slots left.
    #[error("activation limit reached")]
    ActivationLimit(ServerError),

    /// Ed25519 signature missing, malformed, or not matching the payload.
    #[error("signature verification failed{}", detail_suffix(.0))]
    InvalidSignature(String),

    /// No usable public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The offline license file is structurally invalid.
    #[error("invalid license file format: {0}")]
    InvalidFile(String),

    /// This machine has more CPUs than the license allows per node.
    #[error("CPU limit exceeded: machine has {cpus} CPUs, limit is {limit}")]
    CpuLimitExceeded { cpus: u64, limit: u64 },

    /// More nodes are registered than the license allows.
    #[error("node limit exceeded: {nodes} nodes active, limit is {limit}")]
    NodeLimitExceeded { nodes: u64, limit: u64 },

    /// Server error with no semantic mapping.
    #[error(transparent)]
    Server(ServerError),

    /// Network error talking to the license server.
    #[error("network error: {0}")]
    Network(String),

    /// A success response whose body could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Node registry failure during a pipeline stage.
    #[error("{stage}: {source}")]
    Registry {
        /// Pipeline stage (e.g. "register node").
        stage: &'static str,
        #[source]
        source: RegistryError,
    },

    /// The machine fingerprint could not be computed.
    #[error("resolve fingerprint: {0}")]
    Fingerprint(String),

    /// Reading a license file failed.
    #[error("read license file {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required component is not configured.
    #[error("configuration error: {0}")]
    Config(String),

    /// The call context was cancelled or its deadline passed.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

impl LicenseError {
    /// Returns the semantic category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::LicenseNotFound,
            Self::Inactive(_) => ErrorKind::LicenseInactive,
            Self::Expired { .. } => ErrorKind::LicenseExpired,
            Self::ActivationLimit(_) => ErrorKind::ActivationLimit,
            Self::InvalidSignature(_) => ErrorKind::SignatureInvalid,
            Self::InvalidPublicKey(_) => ErrorKind::PublicKeyInvalid,
            Self::InvalidFile(_) => ErrorKind::LicenseFileInvalid,
            Self::CpuLimitExceeded { .. } => ErrorKind::CpuLimitExceeded,
            Self::NodeLimitExceeded { .. } => ErrorKind::NodeLimitExceeded,
            Self::Server(_) => ErrorKind::Server,
            Self::Network(_) | Self::MalformedResponse(_) => ErrorKind::Transport,
            Self::Registry { source, .. } => match source.interrupted() {
                Some(interrupted) => interrupted_kind(interrupted),
                None => ErrorKind::Registry,
            },
            Self::Fingerprint(_) => ErrorKind::Fingerprint,
            Self::ReadFile { .. } => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Config,
            Self::Interrupted(interrupted) => interrupted_kind(*interrupted),
        }
    }

    /// Returns true if this error is of the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Returns the raw server response behind this error, if any.
    ///
    /// Mapped errors (not found, inactive, expired, activation limit) keep
    /// the response they were mapped from.
    #[must_use]
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::NotFound(se)
            | Self::Inactive(se)
            | Self::ActivationLimit(se)
            | Self::Server(se) => Some(se),
            Self::Expired { server, .. } => server.as_ref(),
            _ => None,
        }
    }

    /// Returns the verified license carried by an offline expiry.
    #[must_use]
    pub fn expired_license(&self) -> Option<&OfflineLicenseData> {
        match self {
            Self::Expired { license, .. } => license.as_deref(),
            _ => None,
        }
    }

    /// Consumes the error, returning the verified license of an offline expiry.
    #[must_use]
    pub fn into_expired_license(self) -> Option<OfflineLicenseData> {
        match self {
            Self::Expired { license, .. } => license.map(|l| *l),
            _ => None,
        }
    }

    pub(crate) fn registry(stage: &'static str) -> impl FnOnce(RegistryError) -> Self {
        move |source| Self::Registry { stage, source }
    }
}

fn interrupted_kind(interrupted: Interrupted) -> ErrorKind {
    match interrupted {
        Interrupted::Cancelled => ErrorKind::Cancelled,
        Interrupted::DeadlineExceeded => ErrorKind::DeadlineExceeded,
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
