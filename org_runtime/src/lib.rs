#![forbid(unsafe_code)]

//! Organization runtime.
//!
//! Wraps the kernel with configuration, a durable transaction log, replay,
//! snapshots, session management and drift detection.
//!
//! No domain logic lives here — all transitions and invariants are
//! delegated to the kernel.

pub mod config;
pub mod drift;
pub mod error;
pub mod event_store;
pub mod proto_bridge;
pub mod proto_types;
pub mod replay;
pub mod session;
pub mod snapshot;
pub mod snapshot_codec;

pub use error::{BridgeError, RuntimeError};
