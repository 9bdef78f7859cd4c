//! Registry configuration and table-name validation.

use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};

/// Default table name shared by every backend.
pub const DEFAULT_TABLE_NAME: &str = "warden_license_nodes";

/// Configuration common to every registry backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Table holding one row per fingerprint.
    pub table_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Creates a config with a custom table name.
    #[must_use]
    pub fn with_table_name(name: impl Into<String>) -> Self {
        Self {
            table_name: name.into(),
        }
    }
}

/// Checks that `name` is safe to splice into SQL as an identifier.
///
/// Only ASCII letters, digits and underscores are accepted, and the first
/// character must not be a digit.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidTableName`] for anything else.
pub fn validate_table_name(name: &str) -> RegistryResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidTableName(name.to_string()))
    }
}
