//! OrgKernel v1 — Transaction Definitions
//!
//! Transactions are pure data: intent and payload only, no transition logic.
//! Schema version is locked at 1; the engine rejects anything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Address, Amount, AppId, Namespace, RoleId};

/// Schema version for v1 kernel transactions.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Genesis credit of native currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Allocation {
    pub holder: Address,
    pub amount: Amount,
}

/// Call run through a freshly deployed proxy (constructor payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitCall {
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Transaction {
    /// Bootstrap: ACL, kernel code and proxy, root permissions, genesis funds.
    Initialize {
        root: Address,
        #[serde(default)]
        allocations: Vec<Allocation>,
    },
    DeployCode {
        artifact: String,
    },
    CreatePermission {
        resource: Address,
        action: RoleId,
        actor: Address,
        manager: Address,
    },
    RevokePermission {
        resource: Address,
        action: RoleId,
        actor: Address,
    },
    SetPermissionManager {
        resource: Address,
        action: RoleId,
        actor: Address,
        new_manager: Address,
    },
    SetApp {
        namespace: Namespace,
        app_id: AppId,
        implementation: Address,
    },
    SetDefaultVault {
        app_id: Option<AppId>,
    },
    /// Kernel factory: set the base, deploy a proxy, optionally register it.
    NewAppInstance {
        app_id: AppId,
        base: Address,
        #[serde(default)]
        make_default: bool,
        #[serde(default)]
        pinned: bool,
    },
    NewAppProxy {
        app_id: AppId,
        #[serde(default)]
        pinned: bool,
        #[serde(default)]
        init: Option<InitCall>,
    },
    /// Plain native transfer; no code runs at the recipient.
    Send {
        to: Address,
        amount: Amount,
    },
    DeployToken {
        supply: Amount,
    },
    TokenTransfer {
        token: Address,
        to: Address,
        amount: Amount,
    },
    Call {
        to: Address,
        method: String,
        #[serde(default)]
        args: Value,
        #[serde(default)]
        value: Amount,
    },
    TransferToVault {
        proxy: Address,
        asset: Address,
    },
}

impl Transaction {
    /// Stable snake_case name, matching the serde tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Transaction::Initialize { .. } => "initialize",
            Transaction::DeployCode { .. } => "deploy_code",
            Transaction::CreatePermission { .. } => "create_permission",
            Transaction::RevokePermission { .. } => "revoke_permission",
            Transaction::SetPermissionManager { .. } => "set_permission_manager",
            Transaction::SetApp { .. } => "set_app",
            Transaction::SetDefaultVault { .. } => "set_default_vault",
            Transaction::NewAppInstance { .. } => "new_app_instance",
            Transaction::NewAppProxy { .. } => "new_app_proxy",
            Transaction::Send { .. } => "send",
            Transaction::DeployToken { .. } => "deploy_token",
            Transaction::TokenTransfer { .. } => "token_transfer",
            Transaction::Call { .. } => "call",
            Transaction::TransferToVault { .. } => "transfer_to_vault",
        }
    }
}

/// Sequenced, signed-by-identity transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TxEnvelope {
    pub sequence: u64,
    pub sender: Address,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub tx: Transaction,
}

impl TxEnvelope {
    pub fn new(sequence: u64, sender: Address, tx: Transaction) -> Self {
        Self {
            sequence,
            sender,
            schema_version: SCHEMA_VERSION,
            tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_parses_from_script_json() {
        let v = json!({
            "sequence": 2,
            "sender": "0x0000000000000000000000000000000000000001",
            "tx": {
                "type": "call",
                "to": "0x0000000000000000000000000000000000000002",
                "method": "version"
            }
        });
        let env: TxEnvelope = serde_json::from_value(v).unwrap();
        assert_eq!(env.schema_version, SCHEMA_VERSION);
        assert_eq!(env.tx.type_name(), "call");
        match env.tx {
            Transaction::Call { value, args, .. } => {
                assert_eq!(value, 0);
                assert_eq!(args, Value::Null);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_fields_rejected() {
        let v = json!({
            "sequence": 1,
            "sender": "0x0000000000000000000000000000000000000001",
            "tx": {"type": "deploy_token", "supply": 5, "extra": true}
        });
        assert!(serde_json::from_value::<TxEnvelope>(v).is_err());
    }
}
