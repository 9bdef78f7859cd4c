//! Offline license verification for air-gapped deployments.
//!
//! A license file is a JSON envelope:
//!
//! ```json
//! {"license": {...}, "signature": "<base64>", "public_key": "<base64>"}
//! ```
//!
//! The Ed25519 signature covers the exact bytes of the `license` value as
//! they appear in the file. The value is captured as a raw JSON slice and
//! never re-serialized, since a re-encoding may reorder fields or change
//! whitespace and break a valid signature.
//!
//! A configured trusted key always takes precedence over the key embedded in
//! the file. Without one, anyone can sign a file with their own key and ship
//! that key alongside it.

use crate::error::{LicenseError, LicenseResult};
use crate::types::OfflineLicenseData;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::path::Path;
use tracing::{debug, warn};

/// Offline verifier configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Base64 Ed25519 public key that overrides any key embedded in a file.
    /// Recommended for production.
    pub trusted_public_key: Option<String>,
}

/// Outer structure of a signed license file.
#[derive(Deserialize)]
struct OfflineEnvelope<'a> {
    #[serde(borrow, default)]
    license: Option<&'a RawValue>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    public_key: Option<String>,
}

/// Verifies Ed25519-signed offline license files.
#[derive(Debug, Clone, Default)]
pub struct OfflineValidator {
    trusted_public_key: Option<String>,
}

impl OfflineValidator {
    /// Creates a validator from configuration.
    #[must_use]
    pub fn new(config: OfflineConfig) -> Self {
        Self {
            trusted_public_key: config.trusted_public_key.filter(|k| !k.is_empty()),
        }
    }

    /// Creates a validator pinned to a trusted base64 public key.
    #[must_use]
    pub fn with_trusted_public_key(key: impl Into<String>) -> Self {
        Self::new(OfflineConfig {
            trusted_public_key: Some(key.into()),
        })
    }

    /// Returns true if a trusted key is pinned.
    #[must_use]
    pub fn has_trusted_key(&self) -> bool {
        self.trusted_public_key.is_some()
    }

    /// Reads a license file from disk and verifies it.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::ReadFile`] if the file cannot be read, and
    /// otherwise the same errors as [`OfflineValidator::verify`].
    pub fn verify_file(&self, path: impl AsRef<Path>) -> LicenseResult<OfflineLicenseData> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| LicenseError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        self.verify(&raw)
    }

    /// Verifies a license file's bytes against the current time.
    ///
    /// # Errors
    ///
    /// - [`LicenseError::InvalidFile`]: malformed envelope or payload
    /// - [`LicenseError::InvalidPublicKey`]: no key, or a key that does not decode
    /// - [`LicenseError::InvalidSignature`]: signature does not decode or verify
    /// - [`LicenseError::Expired`]: valid but expired; the error carries the
    ///   parsed license (see [`LicenseError::expired_license`])
    pub fn verify(&self, raw: &[u8]) -> LicenseResult<OfflineLicenseData> {
        self.verify_at(raw, Utc::now())
    }

    /// Verifies a license file's bytes, checking expiry against `now`.
    ///
    /// # Errors
    ///
    /// Same as [`OfflineValidator::verify`].
    pub fn verify_at(&self, raw: &[u8], now: DateTime<Utc>) -> LicenseResult<OfflineLicenseData> {
        let envelope: OfflineEnvelope<'_> = serde_json::from_slice(raw)
            .map_err(|e| LicenseError::InvalidFile(format!("parse envelope: {e}")))?;

        let license = envelope
            .license
            .ok_or_else(|| LicenseError::InvalidFile("missing license".to_string()))?;
        let signature_b64 = envelope
            .signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LicenseError::InvalidFile("missing signature".to_string()))?;

        let key_b64 = self
            .trusted_public_key
            .as_deref()
            .or(envelope.public_key.as_deref().filter(|k| !k.is_empty()))
            .ok_or_else(|| LicenseError::InvalidPublicKey("no public key available".to_string()))?;

        let verifying_key = decode_public_key(key_b64)?;
        let signature = decode_signature(&signature_b64)?;

        // Verify over the raw license bytes exactly as they appear in the file.
        verifying_key
            .verify(license.get().as_bytes(), &signature)
            .map_err(|_| LicenseError::InvalidSignature(String::new()))?;

        let data: OfflineLicenseData = serde_json::from_str(license.get())
            .map_err(|e| LicenseError::InvalidFile(format!("parse license data: {e}")))?;

        if let Some(expires_at) = data.expires_at {
            if expires_at < now {
                warn!(license_key = %data.license_key, %expires_at, "offline license expired");
                return Err(LicenseError::Expired {
                    server: None,
                    license: Some(Box::new(data)),
                });
            }
        }

        debug!(license_key = %data.license_key, plan = %data.plan, "offline license verified");
        Ok(data)
    }
}

fn decode_public_key(key_b64: &str) -> LicenseResult<VerifyingKey> {
    let bytes = BASE64
        .decode(key_b64)
        .map_err(|e| LicenseError::InvalidPublicKey(format!("base64 decode: {e}")))?;
    let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
        LicenseError::InvalidPublicKey(format!(
            "key length {}, expected {PUBLIC_KEY_LENGTH}",
            bytes.len()
        ))
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| LicenseError::InvalidPublicKey("not a valid Ed25519 point".to_string()))
}

fn decode_signature(signature_b64: &str) -> LicenseResult<Signature> {
    let bytes = BASE64
        .decode(signature_b64)
        .map_err(|e| LicenseError::InvalidSignature(format!("signature decode: {e}")))?;
    Signature::from_slice(&bytes)
        .map_err(|_| LicenseError::InvalidSignature(format!("signature length {}", bytes.len())))
}
