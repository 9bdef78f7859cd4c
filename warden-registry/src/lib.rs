//! Node registry for distributed license enforcement.
//!
//! Tracks which machines are currently counted against a license's node
//! limit. Every backend implements [`NodeRegistry`] with the same observable
//! semantics:
//! - Registration is an atomic upsert keyed by fingerprint
//! - `registered_at` is set once, `last_seen_at` moves on every upsert/ping
//! - Listing is ordered by `registered_at` ascending
//! - Pruning removes records not seen within a staleness window
//!
//! Backends receive an already-connected storage handle and never close it.

mod config;
mod error;
mod registry;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use config::{validate_table_name, RegistryConfig, DEFAULT_TABLE_NAME};
pub use error::{RegistryError, RegistryResult};
pub use registry::{NodeRecord, NodeRegistration, NodeRegistry};

#[cfg(feature = "postgres")]
pub use postgres::PostgresRegistry;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRegistry;
