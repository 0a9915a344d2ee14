//! Kernel error taxonomy.
//!
//! Every variant aborts the enclosing transaction. The engine discards the
//! staged state; nothing is retried inside the kernel.

use thiserror::Error;

use crate::domain::{Address, Amount, AppId, RoleId};

/// Reasons a transaction is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// Permission check failed.
    #[error("unauthorized: {actor} lacks {action} on {resource}")]
    Unauthorized {
        resource: Address,
        action: RoleId,
        actor: Address,
    },

    /// Forwarded call resolved to no implementation.
    #[error("no implementation for app {app_id} behind proxy {proxy}")]
    NoImplementation { proxy: Address, app_id: AppId },

    /// Recovery attempted while the default vault pointer is unset or dangling.
    #[error("no default vault configured")]
    NoVaultConfigured,

    /// Underlying value or token move rejected.
    #[error("transfer of {amount} {asset} from {from} to {to} failed: {reason}")]
    TransferFailed {
        asset: Address,
        from: Address,
        to: Address,
        amount: Amount,
        reason: String,
    },

    /// The forwarded implementation failed; its reason is propagated verbatim.
    #[error("call reverted: {0}")]
    CallReverted(String),

    /// The proxy's implementation refuses recovery of this asset.
    #[error("recovery of {asset} disallowed by proxy {proxy}")]
    RecoveryDisallowed { proxy: Address, asset: Address },

    #[error("kernel already initialized")]
    AlreadyInitialized,

    #[error("kernel not initialized: first transaction must be initialize")]
    NotInitialized,

    #[error("permission manager must not be the null address")]
    InvalidManager,

    #[error("no proxy at {0}")]
    UnknownProxy(Address),

    #[error("unknown code artifact {0:?}")]
    UnknownArtifact(String),

    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },

    #[error("sequence violation: expected {expected}, got {got}")]
    SequenceViolation { expected: u64, got: u64 },

    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl KernelError {
    /// Short, stable identifier of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::Unauthorized { .. } => "unauthorized",
            KernelError::NoImplementation { .. } => "no_implementation",
            KernelError::NoVaultConfigured => "no_vault_configured",
            KernelError::TransferFailed { .. } => "transfer_failed",
            KernelError::CallReverted(_) => "call_reverted",
            KernelError::RecoveryDisallowed { .. } => "recovery_disallowed",
            KernelError::AlreadyInitialized => "already_initialized",
            KernelError::NotInitialized => "not_initialized",
            KernelError::InvalidManager => "invalid_manager",
            KernelError::UnknownProxy(_) => "unknown_proxy",
            KernelError::UnknownArtifact(_) => "unknown_artifact",
            KernelError::SchemaMismatch { .. } => "schema_mismatch",
            KernelError::SequenceViolation { .. } => "sequence_violation",
            KernelError::Overflow(_) => "overflow",
            KernelError::InvariantViolation(_) => "invariant_violation",
        }
    }
}
