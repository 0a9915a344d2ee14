//! OrgKernel v1 — Centralized Transition Logic
//!
//! ALL state mutation lives here. Each transaction runs against a clone of
//! the current state; the clone is returned only if every step succeeded.

use crate::apps::{CodeLibrary, KERNEL_ARTIFACT};
use crate::arithmetic::validate_artifact_name;
use crate::domain::{
    Address, Amount, AppId, KernelEvent, ProxyKind, ProxyRecord, Receipt, ACL_APP_ID,
    APP_ADDR_NAMESPACE, APP_BASES_NAMESPACE, CORE_NAMESPACE, ETH, KERNEL_APP_ID,
};
use crate::errors::KernelError;
use crate::events::{Allocation, InitCall, Transaction, TxEnvelope};
use crate::ledger::AssetLedger;
use crate::proxy;
use crate::registry::Registry;
use crate::state::OrgState;

// ---------------------------------------------------------------------------
// Public dispatcher
// ---------------------------------------------------------------------------

/// Apply `env` to `state` and return `(new_state, receipt)`.
///
/// `state` is never mutated. On error the staged clone is dropped, which
/// undoes every partial change made by the transaction.
pub fn apply_transaction(
    state: &OrgState,
    library: &CodeLibrary,
    env: &TxEnvelope,
) -> Result<(OrgState, Receipt), KernelError> {
    let mut new_state = state.clone();
    let sender = env.sender;

    let mut receipt = match &env.tx {
        Transaction::Initialize { root, allocations } => {
            apply_initialize(&mut new_state, library, *root, allocations)
        }
        Transaction::DeployCode { artifact } => apply_deploy_code(&mut new_state, library, artifact),
        Transaction::CreatePermission {
            resource,
            action,
            actor,
            manager,
        } => new_state
            .acl
            .grant(sender, *resource, *action, *actor, *manager)
            .map(with_events),
        Transaction::RevokePermission {
            resource,
            action,
            actor,
        } => new_state
            .acl
            .revoke(sender, *resource, *action, *actor)
            .map(with_events),
        Transaction::SetPermissionManager {
            resource,
            action,
            actor,
            new_manager,
        } => new_state
            .acl
            .set_manager(sender, *resource, *action, *actor, *new_manager)
            .map(with_events),
        Transaction::SetApp {
            namespace,
            app_id,
            implementation,
        } => new_state
            .registry
            .set_entry(&new_state.acl, sender, *namespace, *app_id, *implementation)
            .map(|e| with_events(vec![e])),
        Transaction::SetDefaultVault { app_id } => new_state
            .registry
            .set_default_vault(&new_state.acl, sender, *app_id)
            .map(|e| with_events(vec![e])),
        Transaction::NewAppInstance {
            app_id,
            base,
            make_default,
            pinned,
        } => apply_new_app_instance(&mut new_state, sender, *app_id, *base, *make_default, *pinned),
        Transaction::NewAppProxy {
            app_id,
            pinned,
            init,
        } => apply_new_app_proxy(&mut new_state, library, sender, *app_id, *pinned, init.as_ref()),
        Transaction::Send { to, amount } => new_state
            .ledger
            .transfer(sender, *to, ETH, *amount)
            .map(|e| with_events(vec![e])),
        Transaction::DeployToken { supply } => apply_deploy_token(&mut new_state, sender, *supply),
        Transaction::TokenTransfer { token, to, amount } => {
            apply_token_transfer(&mut new_state, sender, *token, *to, *amount)
        }
        Transaction::Call {
            to,
            method,
            args,
            value,
        } => proxy::dispatch(&mut new_state, library, *to, sender, method, args, *value).map(
            |outcome| Receipt {
                output: Some(outcome.output),
                swept: outcome.swept,
                events: outcome.events,
                ..Default::default()
            },
        ),
        Transaction::TransferToVault { proxy: target, asset } => {
            proxy::transfer_to_vault(&mut new_state, library, *target, *asset).map(
                |(swept, events)| Receipt {
                    swept: Some(swept),
                    events,
                    ..Default::default()
                },
            )
        }
    }?;

    receipt.tx_type = env.tx.type_name().to_string();
    receipt.sequence = env.sequence;
    new_state.logs.extend(receipt.events.iter().cloned());

    Ok((new_state, receipt))
}

// ---------------------------------------------------------------------------
// Individual transition handlers (private)
// ---------------------------------------------------------------------------

fn with_events(events: Vec<KernelEvent>) -> Receipt {
    Receipt {
        events,
        ..Default::default()
    }
}

fn apply_initialize(
    state: &mut OrgState,
    library: &CodeLibrary,
    root: Address,
    allocations: &[Allocation],
) -> Result<Receipt, KernelError> {
    if state.is_initialized() {
        return Err(KernelError::AlreadyInitialized);
    }

    let acl = state.next_address("acl");
    let (kernel_code, code_event) = deploy_code(state, library, KERNEL_ARTIFACT)?;
    let kernel = state.next_address("proxy");

    let mut events = vec![code_event];
    events.extend(state.acl.initialize(acl, root)?);

    state.ledger.mark_non_receiver(acl);
    state.registry = Registry::new(kernel);
    state.registry.write_entry(CORE_NAMESPACE, KERNEL_APP_ID, kernel_code);
    state.registry.write_entry(APP_ADDR_NAMESPACE, ACL_APP_ID, acl);
    state.proxies.insert(
        kernel,
        ProxyRecord {
            address: kernel,
            app_id: KERNEL_APP_ID,
            kind: ProxyKind::Kernel {
                implementation: kernel_code,
            },
        },
    );

    for a in allocations {
        state.ledger.credit_genesis(a.holder, a.amount)?;
    }

    Ok(Receipt {
        created: Some(kernel),
        events,
        ..Default::default()
    })
}

fn deploy_code(
    state: &mut OrgState,
    library: &CodeLibrary,
    artifact: &str,
) -> Result<(Address, KernelEvent), KernelError> {
    validate_artifact_name(artifact)?;
    if !library.contains(artifact) {
        return Err(KernelError::UnknownArtifact(artifact.to_string()));
    }
    let address = state.next_address("code");
    state.code.insert(address, artifact.to_string());
    // Code has no payable entry point; only proxies take unsolicited value.
    state.ledger.mark_non_receiver(address);
    Ok((
        address,
        KernelEvent::CodeDeployed {
            address,
            artifact: artifact.to_string(),
        },
    ))
}

fn apply_deploy_code(
    state: &mut OrgState,
    library: &CodeLibrary,
    artifact: &str,
) -> Result<Receipt, KernelError> {
    let (address, event) = deploy_code(state, library, artifact)?;
    Ok(Receipt {
        created: Some(address),
        events: vec![event],
        ..Default::default()
    })
}

fn apply_new_app_instance(
    state: &mut OrgState,
    sender: Address,
    app_id: AppId,
    base: Address,
    make_default: bool,
    pinned: bool,
) -> Result<Receipt, KernelError> {
    let mut events = vec![state.registry.set_entry(
        &state.acl,
        sender,
        APP_BASES_NAMESPACE,
        app_id,
        base,
    )?];

    let (proxy_address, proxy_event) = proxy::deploy_app_proxy(state, app_id, pinned)?;
    events.push(proxy_event);

    if make_default {
        events.push(state.registry.set_entry(
            &state.acl,
            sender,
            APP_ADDR_NAMESPACE,
            app_id,
            proxy_address,
        )?);
    }

    Ok(Receipt {
        created: Some(proxy_address),
        events,
        ..Default::default()
    })
}

fn apply_new_app_proxy(
    state: &mut OrgState,
    library: &CodeLibrary,
    sender: Address,
    app_id: AppId,
    pinned: bool,
    init: Option<&InitCall>,
) -> Result<Receipt, KernelError> {
    let (proxy_address, proxy_event) = proxy::deploy_app_proxy(state, app_id, pinned)?;
    let mut receipt = Receipt {
        created: Some(proxy_address),
        events: vec![proxy_event],
        ..Default::default()
    };

    if let Some(call) = init {
        let outcome = proxy::forward_call(
            state,
            library,
            proxy_address,
            sender,
            &call.method,
            &call.args,
            0,
        )?;
        receipt.output = Some(outcome.output);
        receipt.events.extend(outcome.events);
    }

    Ok(receipt)
}

fn apply_deploy_token(
    state: &mut OrgState,
    sender: Address,
    supply: Amount,
) -> Result<Receipt, KernelError> {
    let token = state.next_address("token");
    let event = state.ledger.deploy_token(token, sender, supply)?;
    Ok(Receipt {
        created: Some(token),
        events: vec![event],
        ..Default::default()
    })
}

fn apply_token_transfer(
    state: &mut OrgState,
    sender: Address,
    token: Address,
    to: Address,
    amount: Amount,
) -> Result<Receipt, KernelError> {
    if token == ETH {
        return Err(KernelError::TransferFailed {
            asset: token,
            from: sender,
            to,
            amount,
            reason: "native value moves with send, not token_transfer".to_string(),
        });
    }
    let event = state.ledger.transfer(sender, to, token, amount)?;
    Ok(with_events(vec![event]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bytes32;

    const ROOT: Address = Address::from_low_u64(1);

    fn env(seq: u64, tx: Transaction) -> TxEnvelope {
        TxEnvelope::new(seq, ROOT, tx)
    }

    fn initialized() -> (OrgState, CodeLibrary, Address) {
        let lib = CodeLibrary::builtin();
        let (state, receipt) = apply_transaction(
            &OrgState::default(),
            &lib,
            &env(
                1,
                Transaction::Initialize {
                    root: ROOT,
                    allocations: vec![Allocation {
                        holder: ROOT,
                        amount: 1_000,
                    }],
                },
            ),
        )
        .unwrap();
        (state, lib, receipt.created.unwrap())
    }

    #[test]
    fn initialize_wires_kernel_and_acl() {
        let (state, _, kernel) = initialized();
        assert_eq!(state.kernel(), Some(kernel));
        let record = state.proxy(kernel).unwrap();
        assert!(matches!(record.kind, ProxyKind::Kernel { .. }));
        let kernel_code = state.registry.get_entry(CORE_NAMESPACE, KERNEL_APP_ID).unwrap();
        assert_eq!(state.artifact_at(kernel_code), Some(KERNEL_ARTIFACT));
        assert_eq!(
            state.registry.get_entry(APP_ADDR_NAMESPACE, ACL_APP_ID),
            state.acl.acl_address()
        );
        assert_eq!(state.ledger.balance_of(ROOT, ETH), 1_000);
    }

    #[test]
    fn second_initialize_rejected_and_input_untouched() {
        let (state, lib, _) = initialized();
        let err = apply_transaction(
            &state,
            &lib,
            &env(
                2,
                Transaction::Initialize {
                    root: ROOT,
                    allocations: vec![],
                },
            ),
        )
        .unwrap_err();
        assert_eq!(err, KernelError::AlreadyInitialized);
    }

    #[test]
    fn unauthorized_set_app_changes_nothing() {
        let (state, lib, _) = initialized();
        let before = state.clone();
        let err = apply_transaction(
            &state,
            &lib,
            &env(
                2,
                Transaction::SetApp {
                    namespace: APP_BASES_NAMESPACE,
                    app_id: Bytes32::label("stub"),
                    implementation: Address::from_low_u64(5),
                },
            ),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert_eq!(state, before);
    }

    #[test]
    fn failed_new_app_instance_rolls_back_base() {
        let mut engine = crate::engine::OrgEngine::default();
        engine
            .apply(&env(
                1,
                Transaction::Initialize {
                    root: ROOT,
                    allocations: vec![],
                },
            ))
            .unwrap();
        let kernel = engine.state().kernel().unwrap();
        engine
            .apply(&env(
                2,
                Transaction::CreatePermission {
                    resource: kernel,
                    action: crate::domain::APP_MANAGER_ROLE,
                    actor: ROOT,
                    manager: ROOT,
                },
            ))
            .unwrap();
        let before = crate::hashing::canonical_hash(engine.state());

        // Pinned instance over the null base: base write succeeds, proxy
        // deployment fails, and the base write must not survive.
        let err = engine
            .apply(&env(
                3,
                Transaction::NewAppInstance {
                    app_id: Bytes32::label("stub"),
                    base: Address::ZERO,
                    make_default: true,
                    pinned: true,
                },
            ))
            .unwrap_err();
        assert_eq!(err.kind(), "no_implementation");
        assert_eq!(engine.last_sequence(), 2);
        assert_eq!(
            engine
                .state()
                .registry
                .get_entry(APP_BASES_NAMESPACE, Bytes32::label("stub")),
            None
        );
        assert_eq!(engine.state().proxies.len(), 1);
        assert_eq!(crate::hashing::canonical_hash(engine.state()), before);
    }

    #[test]
    fn deploy_unknown_artifact_fails() {
        let (state, lib, _) = initialized();
        let err = apply_transaction(
            &state,
            &lib,
            &env(
                2,
                Transaction::DeployCode {
                    artifact: "missing".to_string(),
                },
            ),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "unknown_artifact");
    }

    #[test]
    fn events_are_logged_on_commit() {
        let (state, lib, _) = initialized();
        let logs_before = state.logs.len();
        let (state, receipt) = apply_transaction(
            &state,
            &lib,
            &env(2, Transaction::DeployToken { supply: 10 }),
        )
        .unwrap();
        assert_eq!(receipt.tx_type, "deploy_token");
        assert_eq!(state.logs.len(), logs_before + 1);
        let token = receipt.created.unwrap();
        assert_eq!(state.ledger.balance_of(ROOT, token), 10);
    }
}
