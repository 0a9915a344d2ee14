//! Proxy dispatch and fund recovery.
//!
//! A proxy has two call surfaces: the recovery selector, handled here and
//! never forwarded, and everything else, forwarded to the implementation
//! resolved for its app id. Callers pass a staged `OrgState`; on error the
//! caller drops it.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::apps::{AppLogic, CallContext, CodeLibrary};
use crate::domain::{
    Address, Amount, AppId, KernelEvent, ProxyKind, ProxyRecord, APP_BASES_NAMESPACE, ETH,
};
use crate::errors::KernelError;
use crate::ledger::AssetLedger;
use crate::state::OrgState;

/// Method name that selects the recovery entry point instead of forwarding.
pub const RECOVERY_SELECTOR: &str = "transfer_to_vault";

/// Outcome of a call made through a proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub output: Value,
    pub swept: Option<Amount>,
    pub events: Vec<KernelEvent>,
}

/// The implementation `proxy` forwards to right now, if any.
///
/// Upgradeable proxies re-resolve through the registry on every call; kernel
/// and pinned proxies use the address captured at construction.
pub fn resolve_implementation(state: &OrgState, proxy: &ProxyRecord) -> Option<Address> {
    match proxy.kind {
        ProxyKind::Kernel { implementation } | ProxyKind::Pinned { implementation } => {
            Some(implementation).filter(|a| !a.is_zero())
        }
        ProxyKind::Upgradeable => state.registry.get_entry(APP_BASES_NAMESPACE, proxy.app_id),
    }
}

/// Resolve the operation table behind `proxy`. Null or code-less
/// implementations are `NoImplementation`.
pub fn resolve_logic(
    state: &OrgState,
    library: &CodeLibrary,
    proxy: &ProxyRecord,
) -> Result<Arc<dyn AppLogic>, KernelError> {
    let no_impl = || KernelError::NoImplementation {
        proxy: proxy.address,
        app_id: proxy.app_id,
    };
    let implementation = resolve_implementation(state, proxy).ok_or_else(no_impl)?;
    let artifact = state.artifact_at(implementation).ok_or_else(no_impl)?;
    library
        .get(artifact)
        .ok_or_else(|| KernelError::UnknownArtifact(artifact.to_string()))
}

/// Deploy a new app proxy bound to `app_id`.
///
/// A pinned proxy captures the current base and fails with
/// `NoImplementation` when there is none.
pub fn deploy_app_proxy(
    state: &mut OrgState,
    app_id: AppId,
    pinned: bool,
) -> Result<(Address, KernelEvent), KernelError> {
    let address = state.next_address("proxy");
    let kind = if pinned {
        let implementation = state
            .registry
            .get_entry(APP_BASES_NAMESPACE, app_id)
            .ok_or(KernelError::NoImplementation {
                proxy: address,
                app_id,
            })?;
        ProxyKind::Pinned { implementation }
    } else {
        ProxyKind::Upgradeable
    };
    state.proxies.insert(
        address,
        ProxyRecord {
            address,
            app_id,
            kind,
        },
    );
    Ok((
        address,
        KernelEvent::NewAppProxy {
            proxy: address,
            app_id,
            pinned,
        },
    ))
}

/// Selector-based entry: recovery or forwarded call.
pub fn dispatch(
    state: &mut OrgState,
    library: &CodeLibrary,
    proxy: Address,
    sender: Address,
    method: &str,
    args: &Value,
    value: Amount,
) -> Result<CallOutcome, KernelError> {
    if method == RECOVERY_SELECTOR {
        #[derive(Deserialize)]
        struct Recover {
            asset: Address,
        }
        if value > 0 {
            return Err(KernelError::CallReverted(
                "recovery does not accept value".to_string(),
            ));
        }
        let Recover { asset } = serde_json::from_value(args.clone()).map_err(|e| {
            KernelError::CallReverted(format!("{}: bad arguments: {}", RECOVERY_SELECTOR, e))
        })?;
        let (swept, events) = transfer_to_vault(state, library, proxy, asset)?;
        return Ok(CallOutcome {
            output: Value::from(swept),
            swept: Some(swept),
            events,
        });
    }
    forward_call(state, library, proxy, sender, method, args, value)
}

/// Run `method` of the proxy's current implementation as the proxy.
///
/// Attached value is credited to the proxy first; if the implementation
/// fails, the caller discards the staged state and the credit with it.
pub fn forward_call(
    state: &mut OrgState,
    library: &CodeLibrary,
    proxy: Address,
    sender: Address,
    method: &str,
    args: &Value,
    value: Amount,
) -> Result<CallOutcome, KernelError> {
    let record = state
        .proxy(proxy)
        .cloned()
        .ok_or(KernelError::UnknownProxy(proxy))?;
    let logic = resolve_logic(state, library, &record)?;

    let mut events = Vec::new();
    if value > 0 {
        events.push(state.ledger.transfer(sender, proxy, ETH, value)?);
    }

    let OrgState {
        registry,
        ledger,
        storage,
        ..
    } = state;
    let slot = storage.entry(proxy).or_default();
    let output = {
        let mut ctx = CallContext::new(proxy, sender, value, registry, slot, ledger, &mut events);
        logic.invoke(&mut ctx, method, args)?
    };
    if slot.is_empty() {
        storage.remove(&proxy);
    }

    debug!(%proxy, method, "forwarded call");
    Ok(CallOutcome {
        output,
        swept: None,
        events,
    })
}

/// Sweep the proxy's entire balance of `asset` into the default vault.
///
/// Public: no permission gate. Returns the amount moved (zero is a valid,
/// successful sweep).
pub fn transfer_to_vault(
    state: &mut OrgState,
    library: &CodeLibrary,
    proxy: Address,
    asset: Address,
) -> Result<(Amount, Vec<KernelEvent>), KernelError> {
    let record = state
        .proxy(proxy)
        .cloned()
        .ok_or(KernelError::UnknownProxy(proxy))?;

    let vault = state
        .registry
        .resolve_default_vault()
        .ok_or(KernelError::NoVaultConfigured)?;

    if let Ok(logic) = resolve_logic(state, library, &record) {
        if !logic.allow_recoverability(asset) {
            return Err(KernelError::RecoveryDisallowed { proxy, asset });
        }
    }

    let amount = state.ledger.balance_of(proxy, asset);
    if vault == proxy {
        return Err(KernelError::TransferFailed {
            asset,
            from: proxy,
            to: vault,
            amount,
            reason: "default vault is the sweeping proxy".to_string(),
        });
    }

    let vault_before = state.ledger.balance_of(vault, asset);
    let transfer = state.ledger.transfer(proxy, vault, asset, amount)?;

    let proxy_after = state.ledger.balance_of(proxy, asset);
    let vault_after = state.ledger.balance_of(vault, asset);
    if proxy_after != 0 || vault_after.checked_sub(vault_before) != Some(amount) {
        return Err(KernelError::InvariantViolation(format!(
            "recovery of {} from {} left {} behind",
            asset, proxy, proxy_after
        )));
    }

    debug!(%proxy, %vault, %asset, amount = %amount, "recovered to vault");
    Ok((
        amount,
        vec![
            transfer,
            KernelEvent::RecoverToVault {
                proxy,
                vault,
                asset,
                amount,
            },
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::PermissionStore;
    use crate::domain::{Bytes32, APP_ADDR_NAMESPACE};
    use crate::registry::Registry;
    use serde_json::json;

    const KERNEL: Address = Address::from_low_u64(0x4e);
    const ROOT: Address = Address::from_low_u64(1);
    const USER: Address = Address::from_low_u64(2);

    /// Hand-wired state: root manages apps, `app_stub` code deployed and
    /// registered as the base for `stub`.
    fn wired() -> (OrgState, CodeLibrary, Address) {
        let mut state = OrgState::default();
        state.acl = PermissionStore::new();
        state.acl.initialize(Address::from_low_u64(0xac1), ROOT).unwrap();
        state
            .acl
            .grant(ROOT, KERNEL, crate::domain::APP_MANAGER_ROLE, ROOT, ROOT)
            .unwrap();
        state.registry = Registry::new(KERNEL);
        state.ledger.credit_genesis(USER, 100).unwrap();

        let code = state.next_address("code");
        state.code.insert(code, "app_stub".to_string());
        state.ledger.mark_non_receiver(code);
        let acl = state.acl.clone();
        state
            .registry
            .set_entry(&acl, ROOT, APP_BASES_NAMESPACE, Bytes32::label("stub"), code)
            .unwrap();
        let (proxy, _) = deploy_app_proxy(&mut state, Bytes32::label("stub"), false).unwrap();
        (state, CodeLibrary::builtin(), proxy)
    }

    #[test]
    fn forward_runs_in_proxy_storage() {
        let (mut state, lib, proxy) = wired();
        dispatch(&mut state, &lib, proxy, USER, "set", &json!({"key": "a", "value": 1}), 0)
            .unwrap();
        assert_eq!(state.storage[&proxy]["a"], json!(1));
        let out = dispatch(&mut state, &lib, proxy, USER, "get", &json!({"key": "a"}), 0).unwrap();
        assert_eq!(out.output, json!(1));
    }

    #[test]
    fn unresolved_app_is_no_implementation() {
        let (mut state, lib, _) = wired();
        let (orphan, _) = deploy_app_proxy(&mut state, Bytes32::label("nothing"), false).unwrap();
        let err = dispatch(&mut state, &lib, orphan, USER, "version", &Value::Null, 0).unwrap_err();
        assert_eq!(err.kind(), "no_implementation");
    }

    #[test]
    fn pinned_proxy_needs_a_base() {
        let (mut state, _, _) = wired();
        let err = deploy_app_proxy(&mut state, Bytes32::label("nothing"), true).unwrap_err();
        assert_eq!(err.kind(), "no_implementation");
    }

    #[test]
    fn recovery_without_vault_fails() {
        let (mut state, lib, proxy) = wired();
        state.ledger.transfer(USER, proxy, ETH, 1).unwrap();
        let err = transfer_to_vault(&mut state, &lib, proxy, ETH).unwrap_err();
        assert_eq!(err, KernelError::NoVaultConfigured);
        assert_eq!(state.ledger.balance_of(proxy, ETH), 1);
    }

    #[test]
    fn recovery_sweeps_everything_then_nothing() {
        let (mut state, lib, proxy) = wired();
        let vault = Address::from_low_u64(0x7a);
        let acl = state.acl.clone();
        state
            .registry
            .set_entry(&acl, ROOT, APP_ADDR_NAMESPACE, Bytes32::label("vault"), vault)
            .unwrap();
        state
            .registry
            .set_default_vault(&acl, ROOT, Some(Bytes32::label("vault")))
            .unwrap();
        state.ledger.transfer(USER, proxy, ETH, 3).unwrap();

        let (first, events) = transfer_to_vault(&mut state, &lib, proxy, ETH).unwrap();
        assert_eq!(first, 3);
        assert_eq!(events.len(), 2);
        assert_eq!(state.ledger.balance_of(vault, ETH), 3);

        let (second, _) = transfer_to_vault(&mut state, &lib, proxy, ETH).unwrap();
        assert_eq!(second, 0);
        assert_eq!(state.ledger.balance_of(vault, ETH), 3);
    }

    #[test]
    fn recovery_selector_is_not_forwarded() {
        let (mut state, lib, proxy) = wired();
        let err = dispatch(
            &mut state,
            &lib,
            proxy,
            USER,
            RECOVERY_SELECTOR,
            &json!({"asset": ETH}),
            0,
        )
        .unwrap_err();
        // The stub has no such method; reaching the vault check proves the
        // selector was handled by the proxy itself.
        assert_eq!(err, KernelError::NoVaultConfigured);
    }
}
