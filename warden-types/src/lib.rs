//! Shared type definitions for Warden.
//!
//! This crate holds the pieces every I/O boundary in the workspace needs:
//! - [`CallContext`]: a cancellation and deadline token threaded through
//!   every network request and storage query
//! - [`Interrupted`]: the error produced when a context cuts a call short

mod context;

pub use context::{CallContext, CancelHandle, Interrupted};
