//! Proto ↔ Kernel conversion bridge.
//!
//! Converts between protobuf wire types (proto_types.rs) and the kernel's
//! typed `TxEnvelope`. Encoding is total; decoding validates identity widths
//! and argument JSON and never guesses a default for a malformed field.

use serde_json::Value;

use org_kernel::domain::{Address, Bytes32};
use org_kernel::events::{Allocation, InitCall, Transaction, TxEnvelope};

use crate::error::BridgeError;
use crate::proto_types::*;

/// Convert a protobuf envelope to the kernel's `TxEnvelope`.
pub fn proto_to_tx(proto: &ProtoTxEnvelope) -> Result<TxEnvelope, BridgeError> {
    let kind = proto
        .tx
        .as_ref()
        .and_then(|t| t.kind.as_ref())
        .ok_or(BridgeError::MissingTransaction {
            sequence: proto.sequence,
        })?;

    let tx = match kind {
        TxKind::Initialize(m) => Transaction::Initialize {
            root: addr("initialize.root", &m.root)?,
            allocations: m
                .allocations
                .iter()
                .map(|a| {
                    Ok::<_, BridgeError>(Allocation {
                        holder: addr("initialize.allocations.holder", &a.holder)?,
                        amount: a.amount,
                    })
                })
                .collect::<Result<_, BridgeError>>()?,
        },
        TxKind::DeployCode(m) => Transaction::DeployCode {
            artifact: m.artifact.clone(),
        },
        TxKind::CreatePermission(m) => Transaction::CreatePermission {
            resource: addr("create_permission.resource", &m.resource)?,
            action: key("create_permission.action", &m.action)?,
            actor: addr("create_permission.actor", &m.actor)?,
            manager: addr("create_permission.manager", &m.manager)?,
        },
        TxKind::RevokePermission(m) => Transaction::RevokePermission {
            resource: addr("revoke_permission.resource", &m.resource)?,
            action: key("revoke_permission.action", &m.action)?,
            actor: addr("revoke_permission.actor", &m.actor)?,
        },
        TxKind::SetPermissionManager(m) => Transaction::SetPermissionManager {
            resource: addr("set_permission_manager.resource", &m.resource)?,
            action: key("set_permission_manager.action", &m.action)?,
            actor: addr("set_permission_manager.actor", &m.actor)?,
            new_manager: addr("set_permission_manager.new_manager", &m.new_manager)?,
        },
        TxKind::SetApp(m) => Transaction::SetApp {
            namespace: key("set_app.namespace", &m.namespace)?,
            app_id: key("set_app.app_id", &m.app_id)?,
            implementation: addr("set_app.implementation", &m.implementation)?,
        },
        TxKind::SetDefaultVault(m) => Transaction::SetDefaultVault {
            app_id: m
                .app_id
                .as_deref()
                .map(|b| key("set_default_vault.app_id", b))
                .transpose()?,
        },
        TxKind::NewAppInstance(m) => Transaction::NewAppInstance {
            app_id: key("new_app_instance.app_id", &m.app_id)?,
            base: addr("new_app_instance.base", &m.base)?,
            make_default: m.make_default,
            pinned: m.pinned,
        },
        TxKind::NewAppProxy(m) => Transaction::NewAppProxy {
            app_id: key("new_app_proxy.app_id", &m.app_id)?,
            pinned: m.pinned,
            init: m
                .init
                .as_ref()
                .map(|c| {
                    Ok::<_, BridgeError>(InitCall {
                        method: c.method.clone(),
                        args: args("new_app_proxy.init.args_json", &c.args_json)?,
                    })
                })
                .transpose()?,
        },
        TxKind::Send(m) => Transaction::Send {
            to: addr("send.to", &m.to)?,
            amount: m.amount,
        },
        TxKind::DeployToken(m) => Transaction::DeployToken { supply: m.supply },
        TxKind::TokenTransfer(m) => Transaction::TokenTransfer {
            token: addr("token_transfer.token", &m.token)?,
            to: addr("token_transfer.to", &m.to)?,
            amount: m.amount,
        },
        TxKind::Call(m) => Transaction::Call {
            to: addr("call.to", &m.to)?,
            method: m.method.clone(),
            args: args("call.args_json", &m.args_json)?,
            value: m.value,
        },
        TxKind::TransferToVault(m) => Transaction::TransferToVault {
            proxy: addr("transfer_to_vault.proxy", &m.proxy)?,
            asset: addr("transfer_to_vault.asset", &m.asset)?,
        },
    };

    Ok(TxEnvelope {
        sequence: proto.sequence,
        sender: addr("sender", &proto.sender)?,
        schema_version: proto.schema_version,
        tx,
    })
}

/// Convert a kernel `TxEnvelope` to its protobuf form.
///
/// Used for persisting transactions to the append-only binary log.
pub fn tx_to_proto(env: &TxEnvelope) -> ProtoTxEnvelope {
    let kind = match &env.tx {
        Transaction::Initialize { root, allocations } => TxKind::Initialize(Initialize {
            root: root.0.to_vec(),
            allocations: allocations
                .iter()
                .map(|a| ProtoAllocation {
                    holder: a.holder.0.to_vec(),
                    amount: a.amount,
                })
                .collect(),
        }),
        Transaction::DeployCode { artifact } => TxKind::DeployCode(DeployCode {
            artifact: artifact.clone(),
        }),
        Transaction::CreatePermission {
            resource,
            action,
            actor,
            manager,
        } => TxKind::CreatePermission(CreatePermission {
            resource: resource.0.to_vec(),
            action: action.0.to_vec(),
            actor: actor.0.to_vec(),
            manager: manager.0.to_vec(),
        }),
        Transaction::RevokePermission {
            resource,
            action,
            actor,
        } => TxKind::RevokePermission(RevokePermission {
            resource: resource.0.to_vec(),
            action: action.0.to_vec(),
            actor: actor.0.to_vec(),
        }),
        Transaction::SetPermissionManager {
            resource,
            action,
            actor,
            new_manager,
        } => TxKind::SetPermissionManager(SetPermissionManager {
            resource: resource.0.to_vec(),
            action: action.0.to_vec(),
            actor: actor.0.to_vec(),
            new_manager: new_manager.0.to_vec(),
        }),
        Transaction::SetApp {
            namespace,
            app_id,
            implementation,
        } => TxKind::SetApp(SetApp {
            namespace: namespace.0.to_vec(),
            app_id: app_id.0.to_vec(),
            implementation: implementation.0.to_vec(),
        }),
        Transaction::SetDefaultVault { app_id } => TxKind::SetDefaultVault(SetDefaultVault {
            app_id: app_id.map(|id| id.0.to_vec()),
        }),
        Transaction::NewAppInstance {
            app_id,
            base,
            make_default,
            pinned,
        } => TxKind::NewAppInstance(NewAppInstance {
            app_id: app_id.0.to_vec(),
            base: base.0.to_vec(),
            make_default: *make_default,
            pinned: *pinned,
        }),
        Transaction::NewAppProxy {
            app_id,
            pinned,
            init,
        } => TxKind::NewAppProxy(NewAppProxy {
            app_id: app_id.0.to_vec(),
            pinned: *pinned,
            init: init.as_ref().map(|c| ProtoInitCall {
                method: c.method.clone(),
                args_json: c.args.to_string(),
            }),
        }),
        Transaction::Send { to, amount } => TxKind::Send(SendValue {
            to: to.0.to_vec(),
            amount: *amount,
        }),
        Transaction::DeployToken { supply } => {
            TxKind::DeployToken(DeployToken { supply: *supply })
        }
        Transaction::TokenTransfer { token, to, amount } => {
            TxKind::TokenTransfer(TokenTransfer {
                token: token.0.to_vec(),
                to: to.0.to_vec(),
                amount: *amount,
            })
        }
        Transaction::Call {
            to,
            method,
            args,
            value,
        } => TxKind::Call(Call {
            to: to.0.to_vec(),
            method: method.clone(),
            args_json: args.to_string(),
            value: *value,
        }),
        Transaction::TransferToVault { proxy, asset } => {
            TxKind::TransferToVault(TransferToVault {
                proxy: proxy.0.to_vec(),
                asset: asset.0.to_vec(),
            })
        }
    };

    ProtoTxEnvelope {
        sequence: env.sequence,
        sender: env.sender.0.to_vec(),
        schema_version: env.schema_version,
        tx: Some(ProtoTransaction { kind: Some(kind) }),
    }
}

fn addr(field: &'static str, bytes: &[u8]) -> Result<Address, BridgeError> {
    Address::try_from(bytes).map_err(|reason| BridgeError::BadIdentity { field, reason })
}

fn key(field: &'static str, bytes: &[u8]) -> Result<Bytes32, BridgeError> {
    Bytes32::try_from(bytes).map_err(|reason| BridgeError::BadIdentity { field, reason })
}

/// Empty text is the absent-arguments case.
fn args(field: &'static str, text: &str) -> Result<Value, BridgeError> {
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| BridgeError::BadArgs {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use org_kernel::domain::{APP_BASES_NAMESPACE, APP_MANAGER_ROLE};
    use prost::Message;
    use serde_json::json;

    const ROOT: Address = Address::from_low_u64(1);

    #[test]
    fn call_survives_the_wire() {
        let env = TxEnvelope::new(
            4,
            ROOT,
            Transaction::Call {
                to: Address::from_low_u64(9),
                method: "set".to_string(),
                args: json!({"key": "k", "value": [1, 2]}),
                value: 3,
            },
        );
        let bytes = tx_to_proto(&env).encode_to_vec();
        let decoded = ProtoTxEnvelope::decode(bytes.as_slice()).unwrap();
        assert_eq!(proto_to_tx(&decoded).unwrap(), env);
    }

    #[test]
    fn cleared_default_vault_stays_cleared() {
        let env = TxEnvelope::new(2, ROOT, Transaction::SetDefaultVault { app_id: None });
        let proto = tx_to_proto(&env);
        assert_eq!(proto_to_tx(&proto).unwrap(), env);

        let set = TxEnvelope::new(
            3,
            ROOT,
            Transaction::SetDefaultVault {
                app_id: Some(Bytes32::label("vault")),
            },
        );
        assert_eq!(proto_to_tx(&tx_to_proto(&set)).unwrap(), set);
    }

    #[test]
    fn short_address_is_rejected() {
        let mut proto = tx_to_proto(&TxEnvelope::new(
            2,
            ROOT,
            Transaction::CreatePermission {
                resource: ROOT,
                action: APP_MANAGER_ROLE,
                actor: ROOT,
                manager: ROOT,
            },
        ));
        if let Some(ProtoTransaction {
            kind: Some(TxKind::CreatePermission(m)),
        }) = proto.tx.as_mut()
        {
            m.actor.truncate(19);
        }
        let err = proto_to_tx(&proto).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::BadIdentity {
                field: "create_permission.actor",
                ..
            }
        ));
    }

    #[test]
    fn missing_transaction_is_rejected() {
        let proto = ProtoTxEnvelope {
            sequence: 7,
            sender: ROOT.0.to_vec(),
            schema_version: 1,
            tx: None,
        };
        assert_eq!(
            proto_to_tx(&proto).unwrap_err(),
            BridgeError::MissingTransaction { sequence: 7 }
        );
    }

    #[test]
    fn bad_args_json_is_rejected() {
        let mut proto = tx_to_proto(&TxEnvelope::new(
            2,
            ROOT,
            Transaction::Call {
                to: ROOT,
                method: "get".to_string(),
                args: Value::Null,
                value: 0,
            },
        ));
        if let Some(ProtoTransaction {
            kind: Some(TxKind::Call(m)),
        }) = proto.tx.as_mut()
        {
            m.args_json = "{not json".to_string();
        }
        assert!(matches!(
            proto_to_tx(&proto).unwrap_err(),
            BridgeError::BadArgs { .. }
        ));
    }

    #[test]
    fn registry_write_keeps_namespace() {
        let env = TxEnvelope::new(
            5,
            ROOT,
            Transaction::SetApp {
                namespace: APP_BASES_NAMESPACE,
                app_id: Bytes32::label("stub"),
                implementation: Address::from_low_u64(3),
            },
        );
        assert_eq!(proto_to_tx(&tx_to_proto(&env)).unwrap(), env);
    }
}
