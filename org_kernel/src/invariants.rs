//! OrgKernel v1 — Invariant Checks
//!
//! Hard-fail validation run on every staged state before commit and on every
//! restored snapshot. The first failure is returned as
//! `KernelError::InvariantViolation` tagged `[INVARIANT:<name>]`.

use crate::arithmetic::checked_sum;
use crate::domain::{ProxyKind, ETH};
use crate::errors::KernelError;
use crate::state::OrgState;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all checks in a fixed order.
pub fn validate_invariants(state: &OrgState) -> Result<(), KernelError> {
    check_grant_keys(state)?;
    check_registry_entries(state)?;
    check_proxy_code(state)?;
    check_native_supply(state)?;
    check_token_supply(state)?;
    Ok(())
}

fn violation(name: &str, detail: String) -> KernelError {
    KernelError::InvariantViolation(format!("[INVARIANT:{}] {}", name, detail))
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

/// Every grant lives under its own key and names a real manager.
fn check_grant_keys(state: &OrgState) -> Result<(), KernelError> {
    for (key, grant) in state.acl.entries() {
        if *key != grant.key() {
            return Err(violation(
                "grant_key",
                format!(
                    "grant ({}, {}, {}) stored under a foreign key",
                    grant.resource, grant.action, grant.actor
                ),
            ));
        }
        if grant.manager.is_zero() {
            return Err(violation(
                "grant_manager",
                format!(
                    "grant ({}, {}, {}) has the null manager",
                    grant.resource, grant.action, grant.actor
                ),
            ));
        }
    }
    Ok(())
}

/// Unset means absent: no entry maps to the null address.
fn check_registry_entries(state: &OrgState) -> Result<(), KernelError> {
    for entry in state.registry.entries() {
        if entry.implementation.is_zero() {
            return Err(violation(
                "registry_zero_entry",
                format!("entry ({}, {}) maps to ZERO", entry.namespace, entry.app_id),
            ));
        }
    }
    Ok(())
}

/// Kernel and pinned proxies captured an implementation that has code.
fn check_proxy_code(state: &OrgState) -> Result<(), KernelError> {
    for record in state.proxies.values() {
        let fixed = match record.kind {
            ProxyKind::Kernel { implementation } | ProxyKind::Pinned { implementation } => {
                implementation
            }
            ProxyKind::Upgradeable => continue,
        };
        if state.artifact_at(fixed).is_none() {
            return Err(violation(
                "proxy_code",
                format!(
                    "proxy {} is fixed to {} which has no deployed code",
                    record.address, fixed
                ),
            ));
        }
    }
    Ok(())
}

/// Native value is only ever moved, never minted after genesis.
fn check_native_supply(state: &OrgState) -> Result<(), KernelError> {
    let total = checked_sum(state.ledger.native_balances().map(|(_, b)| *b))?;
    if total != state.ledger.native_supply() {
        return Err(violation(
            "native_supply",
            format!(
                "balances sum to {} but genesis supply is {}",
                total,
                state.ledger.native_supply()
            ),
        ));
    }
    Ok(())
}

fn check_token_supply(state: &OrgState) -> Result<(), KernelError> {
    for (token, record) in state.ledger.tokens() {
        if *token == ETH {
            return Err(violation(
                "token_address",
                "a token is registered at the native sentinel".to_string(),
            ));
        }
        let total = checked_sum(record.balances.values().copied())?;
        if total != record.supply {
            return Err(violation(
                "token_supply",
                format!(
                    "token {} balances sum to {} but supply is {}",
                    token, total, record.supply
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Bytes32, ProxyRecord};
    use crate::state::create_initial_state;

    #[test]
    fn empty_state_is_valid() {
        assert!(validate_invariants(&create_initial_state()).is_ok());
    }

    #[test]
    fn pinned_proxy_without_code_is_rejected() {
        let mut state = create_initial_state();
        let proxy = Address::from_low_u64(9);
        state.proxies.insert(
            proxy,
            ProxyRecord {
                address: proxy,
                app_id: Bytes32::label("stub"),
                kind: ProxyKind::Pinned {
                    implementation: Address::from_low_u64(10),
                },
            },
        );
        let err = validate_invariants(&state).unwrap_err();
        assert!(err.to_string().contains("[INVARIANT:proxy_code]"));
    }

    #[test]
    fn upgradeable_proxy_needs_no_code() {
        let mut state = create_initial_state();
        let proxy = Address::from_low_u64(9);
        state.proxies.insert(
            proxy,
            ProxyRecord {
                address: proxy,
                app_id: Bytes32::label("stub"),
                kind: ProxyKind::Upgradeable,
            },
        );
        assert!(validate_invariants(&state).is_ok());
    }

    #[test]
    fn genesis_credit_keeps_supply_balanced() {
        let mut state = create_initial_state();
        state
            .ledger
            .credit_genesis(Address::from_low_u64(1), 50)
            .unwrap();
        state
            .ledger
            .credit_genesis(Address::from_low_u64(2), 25)
            .unwrap();
        assert!(validate_invariants(&state).is_ok());
    }
}
