#![forbid(unsafe_code)]

/// Kernel v1 — Immutable. Behavioral changes require kernel_v2.
pub const KERNEL_VERSION: u32 = 1;

pub mod acl;
pub mod apps;
pub mod arithmetic;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod events;
pub mod hashing;
pub mod invariants;
pub mod ledger;
pub mod proxy;
pub mod registry;
pub mod state;
pub mod transitions;

pub use errors::KernelError;
