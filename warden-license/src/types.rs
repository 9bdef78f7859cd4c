//! Wire and result types shared by the online, offline and managed paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// License features: string keys to arbitrary JSON values.
pub type Features = serde_json::Map<String, serde_json::Value>;

/// Request body for `POST /v1/validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub license_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ValidateRequest {
    /// A request for `license_key` with no fingerprint or version.
    #[must_use]
    pub fn new(license_key: impl Into<String>) -> Self {
        Self {
            license_key: license_key.into(),
            ..Self::default()
        }
    }

    /// Sets the machine fingerprint.
    #[must_use]
    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Sets the application version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Response of `POST /v1/validate` (not enveloped).
///
/// `valid: false` is a normal outcome, not an error; `reason` explains it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Features::is_empty"
    )]
    pub features: Features,
    #[serde(default, deserialize_with = "null_as_default")]
    pub activation_remaining: i64,
}

/// Request body for `POST /v1/activate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateRequest {
    pub license_key: String,
    pub fingerprint: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

/// An activation as recorded by the server (`data` of `/v1/activate`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub license_id: String,
    pub fingerprint: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hostname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub os: String,
    pub activated_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// License payload embedded in a signed offline file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfflineLicenseData {
    pub license_key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub company_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plan: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Features,
    #[serde(default, deserialize_with = "optional_instant")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_instant")]
    pub issued_at: Option<DateTime<Utc>>,
}

/// Unified result of managed validation and enforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub valid: bool,
    pub license_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Features::is_empty")]
    pub features: Features,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub fingerprint: String,
    /// Live node count, present when a node registry is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u64>,
}

impl LicenseInfo {
    pub(crate) fn invalid(license_key: &str, fingerprint: String) -> Self {
        Self {
            valid: false,
            license_key: license_key.to_string(),
            plan: None,
            features: Features::new(),
            expires_at: None,
            fingerprint,
            node_count: None,
        }
    }
}

/// Issuers that serialize an unset instant write `0001-01-01T00:00:00Z`;
/// treat it (and `null`) as absent.
fn optional_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    const ZERO_INSTANT_SECS: i64 = -62_135_596_800;
    let instant = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(instant.filter(|t| t.timestamp() != ZERO_INSTANT_SECS))
}

/// Reads an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
