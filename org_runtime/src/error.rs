//! Runtime error taxonomy.
//!
//! Kernel rejections pass through unchanged; everything else is about the
//! bytes on disk or on the wire.

use std::io;

use thiserror::Error;

use org_kernel::KernelError;

use crate::config::ConfigError;
use crate::snapshot_codec::SnapshotError;

/// Protobuf ↔ kernel conversion failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("envelope {sequence} carries no transaction")]
    MissingTransaction { sequence: u64 },

    #[error("{field}: {reason}")]
    BadIdentity { field: &'static str, reason: String },

    #[error("{field}: arguments are not valid JSON: {reason}")]
    BadArgs { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("transaction log corrupt: {0}")]
    CorruptLog(String),

    #[error("transaction log sequence violation: expected {expected}, got {got}")]
    LogSequence { expected: u64, got: u64 },

    #[error("wire conversion failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("kernel rejected transaction: {0}")]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("session lock poisoned")]
    Poisoned,
}
