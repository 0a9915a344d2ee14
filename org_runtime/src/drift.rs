//! Drift detection — determinism verification and state comparison.
//!
//! All amounts are integers; deltas are reported as before/after pairs so
//! no signed arithmetic is needed.

use std::collections::{BTreeMap, BTreeSet};

use org_kernel::acl::Grant;
use org_kernel::apps::CodeLibrary;
use org_kernel::domain::{Address, Amount, AppId, Namespace, ETH};
use org_kernel::events::TxEnvelope;
use org_kernel::hashing::canonical_hash;
use org_kernel::state::OrgState;
use thiserror::Error;

use crate::replay;

#[derive(Debug, Error)]
pub enum DriftError {
    #[error("replay rejected: {0}")]
    Replay(#[from] org_kernel::KernelError),

    #[error("determinism failure: run 1 = {first}, run 2 = {second}")]
    Nondeterministic { first: String, second: String },
}

/// Replay the same transactions twice through independent engines and
/// require identical hashes. Returns the hash.
pub fn verify_determinism(library: &CodeLibrary, envs: &[TxEnvelope]) -> Result<String, DriftError> {
    let first = replay::rebuild_hash(library, envs)?;
    let second = replay::rebuild_hash(library, envs)?;
    if first != second {
        return Err(DriftError::Nondeterministic { first, second });
    }
    Ok(first)
}

/// A registry slot whose value differs between the two states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryChange {
    pub namespace: Namespace,
    pub app_id: AppId,
    pub before: Option<Address>,
    pub after: Option<Address>,
}

/// A holder whose balance of one asset differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub asset: Address,
    pub holder: Address,
    pub before: Amount,
    pub after: Amount,
}

/// Structured comparison of two states, `a` → `b`.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
    pub hash_a: String,
    pub hash_b: String,
    pub grants_added: Vec<Grant>,
    pub grants_removed: Vec<Grant>,
    /// Grants present in both with a different manager: (before, after).
    pub managers_changed: Vec<(Grant, Grant)>,
    pub registry_changes: Vec<RegistryChange>,
    pub default_vault_a: Option<AppId>,
    pub default_vault_b: Option<AppId>,
    pub proxies_added: Vec<Address>,
    pub proxies_removed: Vec<Address>,
    pub balance_changes: Vec<BalanceChange>,
}

impl DriftReport {
    /// True when the two states hash identically.
    pub fn is_identical(&self) -> bool {
        self.hash_a == self.hash_b
    }
}

pub fn compare_states(a: &OrgState, b: &OrgState) -> DriftReport {
    // -- grants --
    let grants_a: BTreeMap<_, &Grant> = a.acl.grants().map(|g| (g.key(), g)).collect();
    let grants_b: BTreeMap<_, &Grant> = b.acl.grants().map(|g| (g.key(), g)).collect();

    let grants_added = grants_b
        .iter()
        .filter(|(k, _)| !grants_a.contains_key(*k))
        .map(|(_, g)| (*g).clone())
        .collect();
    let grants_removed = grants_a
        .iter()
        .filter(|(k, _)| !grants_b.contains_key(*k))
        .map(|(_, g)| (*g).clone())
        .collect();
    let managers_changed = grants_a
        .iter()
        .filter_map(|(k, ga)| {
            grants_b
                .get(k)
                .filter(|gb| gb.manager != ga.manager)
                .map(|gb| ((*ga).clone(), (*gb).clone()))
        })
        .collect();

    // -- registry --
    let entries_a: BTreeMap<_, _> = a
        .registry
        .entries()
        .map(|e| ((e.namespace, e.app_id), e.implementation))
        .collect();
    let entries_b: BTreeMap<_, _> = b
        .registry
        .entries()
        .map(|e| ((e.namespace, e.app_id), e.implementation))
        .collect();
    let slots: BTreeSet<_> = entries_a.keys().chain(entries_b.keys()).copied().collect();
    let registry_changes = slots
        .into_iter()
        .filter_map(|slot| {
            let before = entries_a.get(&slot).copied();
            let after = entries_b.get(&slot).copied();
            (before != after).then(|| RegistryChange {
                namespace: slot.0,
                app_id: slot.1,
                before,
                after,
            })
        })
        .collect();

    // -- proxies --
    let proxies_added = b
        .proxies
        .keys()
        .filter(|p| !a.proxies.contains_key(p))
        .copied()
        .collect();
    let proxies_removed = a
        .proxies
        .keys()
        .filter(|p| !b.proxies.contains_key(p))
        .copied()
        .collect();

    DriftReport {
        hash_a: canonical_hash(a),
        hash_b: canonical_hash(b),
        grants_added,
        grants_removed,
        managers_changed,
        registry_changes,
        default_vault_a: a.registry.default_vault_id(),
        default_vault_b: b.registry.default_vault_id(),
        proxies_added,
        proxies_removed,
        balance_changes: balance_changes(a, b),
    }
}

/// (asset, holder) → amount, native under `ETH`.
fn balances(state: &OrgState) -> BTreeMap<(Address, Address), Amount> {
    let mut out = BTreeMap::new();
    for (holder, amount) in state.ledger.native_balances() {
        out.insert((ETH, *holder), *amount);
    }
    for (token, record) in state.ledger.tokens() {
        for (holder, amount) in &record.balances {
            out.insert((*token, *holder), *amount);
        }
    }
    out
}

fn balance_changes(a: &OrgState, b: &OrgState) -> Vec<BalanceChange> {
    let ba = balances(a);
    let bb = balances(b);
    let keys: BTreeSet<_> = ba.keys().chain(bb.keys()).copied().collect();
    keys.into_iter()
        .filter_map(|(asset, holder)| {
            let before = ba.get(&(asset, holder)).copied().unwrap_or(0);
            let after = bb.get(&(asset, holder)).copied().unwrap_or(0);
            (before != after).then_some(BalanceChange {
                asset,
                holder,
                before,
                after,
            })
        })
        .collect()
}
