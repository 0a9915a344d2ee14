//! OrgKernel v1 — State
//!
//! Everything a transaction may touch lives here, so a clone is a complete
//! staging area and dropping it is a complete rollback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::acl::PermissionStore;
use crate::domain::{Address, KernelEvent, ProxyRecord};
use crate::ledger::Ledger;
use crate::registry::Registry;

/// Complete organization state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrgState {
    pub acl: PermissionStore,
    pub registry: Registry,
    pub ledger: Ledger,
    pub proxies: BTreeMap<Address, ProxyRecord>,
    /// Code address → artifact name.
    pub code: BTreeMap<Address, String>,
    /// Per-proxy persistent storage written by forwarded calls.
    pub storage: BTreeMap<Address, BTreeMap<String, Value>>,
    /// Counter feeding address derivation.
    pub nonce: u64,
    /// Emitted events, oldest first. Not part of the canonical hash.
    pub logs: Vec<KernelEvent>,
}

impl OrgState {
    pub fn is_initialized(&self) -> bool {
        self.acl.acl_address().is_some()
    }

    /// Derive a fresh address: first 20 bytes of `sha256(tag || nonce)`.
    pub fn next_address(&mut self, tag: &str) -> Address {
        let mut hasher = Sha256::new();
        hasher.update(tag.as_bytes());
        hasher.update(self.nonce.to_be_bytes());
        let digest = hasher.finalize();
        self.nonce += 1;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Address(bytes)
    }

    pub fn proxy(&self, address: Address) -> Option<&ProxyRecord> {
        self.proxies.get(&address)
    }

    /// Artifact deployed at `address`, if any.
    pub fn artifact_at(&self, address: Address) -> Option<&str> {
        self.code.get(&address).map(String::as_str)
    }

    /// The kernel proxy's address, once initialized.
    pub fn kernel(&self) -> Option<Address> {
        self.is_initialized().then(|| self.registry.kernel())
    }
}

/// Create a fresh, empty state. The first transaction must be `initialize`.
pub fn create_initial_state() -> OrgState {
    OrgState::default()
}
