//! Hand-written protobuf types for the transaction log.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Identities travel as raw bytes (20 for addresses, 32 for keys); call
//! arguments travel as compact JSON text.

use prost::Message;

// ── Envelope ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoTxEnvelope {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub sender: Vec<u8>,
    #[prost(uint32, tag = "3")]
    pub schema_version: u32,
    #[prost(message, optional, tag = "4")]
    pub tx: Option<ProtoTransaction>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoTransaction {
    #[prost(
        oneof = "TxKind",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14"
    )]
    pub kind: Option<TxKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum TxKind {
    #[prost(message, tag = "1")]
    Initialize(Initialize),
    #[prost(message, tag = "2")]
    DeployCode(DeployCode),
    #[prost(message, tag = "3")]
    CreatePermission(CreatePermission),
    #[prost(message, tag = "4")]
    RevokePermission(RevokePermission),
    #[prost(message, tag = "5")]
    SetPermissionManager(SetPermissionManager),
    #[prost(message, tag = "6")]
    SetApp(SetApp),
    #[prost(message, tag = "7")]
    SetDefaultVault(SetDefaultVault),
    #[prost(message, tag = "8")]
    NewAppInstance(NewAppInstance),
    #[prost(message, tag = "9")]
    NewAppProxy(NewAppProxy),
    #[prost(message, tag = "10")]
    Send(SendValue),
    #[prost(message, tag = "11")]
    DeployToken(DeployToken),
    #[prost(message, tag = "12")]
    TokenTransfer(TokenTransfer),
    #[prost(message, tag = "13")]
    Call(Call),
    #[prost(message, tag = "14")]
    TransferToVault(TransferToVault),
}

// ── Shared ─────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoAllocation {
    #[prost(bytes = "vec", tag = "1")]
    pub holder: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub amount: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoInitCall {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(string, tag = "2")]
    pub args_json: String,
}

// ── Transaction Types ──────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Initialize {
    #[prost(bytes = "vec", tag = "1")]
    pub root: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub allocations: Vec<ProtoAllocation>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeployCode {
    #[prost(string, tag = "1")]
    pub artifact: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreatePermission {
    #[prost(bytes = "vec", tag = "1")]
    pub resource: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub action: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub actor: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub manager: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RevokePermission {
    #[prost(bytes = "vec", tag = "1")]
    pub resource: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub action: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub actor: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SetPermissionManager {
    #[prost(bytes = "vec", tag = "1")]
    pub resource: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub action: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub actor: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub new_manager: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SetApp {
    #[prost(bytes = "vec", tag = "1")]
    pub namespace: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub app_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub implementation: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SetDefaultVault {
    /// Absent clears the pointer.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub app_id: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NewAppInstance {
    #[prost(bytes = "vec", tag = "1")]
    pub app_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub base: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub make_default: bool,
    #[prost(bool, tag = "4")]
    pub pinned: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct NewAppProxy {
    #[prost(bytes = "vec", tag = "1")]
    pub app_id: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub pinned: bool,
    #[prost(message, optional, tag = "3")]
    pub init: Option<ProtoInitCall>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SendValue {
    #[prost(bytes = "vec", tag = "1")]
    pub to: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub amount: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeployToken {
    #[prost(uint64, tag = "1")]
    pub supply: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TokenTransfer {
    #[prost(bytes = "vec", tag = "1")]
    pub token: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub to: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub amount: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Call {
    #[prost(bytes = "vec", tag = "1")]
    pub to: Vec<u8>,
    #[prost(string, tag = "2")]
    pub method: String,
    #[prost(string, tag = "3")]
    pub args_json: String,
    #[prost(uint64, tag = "4")]
    pub value: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TransferToVault {
    #[prost(bytes = "vec", tag = "1")]
    pub proxy: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub asset: Vec<u8>,
}
