//! OrgKernel v1 — Canonical Hashing
//!
//! Deterministic canonical serialization + SHA-256 hashing.
//! Produces byte-identical output across platforms.
//!
//! Rules:
//!   - `kernel_version` first, then fixed top-level field order
//!   - Every collection sorted by its key (BTreeMap order)
//!   - Amounts and the nonce written as decimal strings
//!   - Addresses and 32-byte keys as lowercase `0x` hex
//!   - Object keys inside stored values sorted, at every depth
//!   - Event logs excluded: they are history, not state
//!   - UTF-8 JSON, no whitespace

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::acl::PermissionStore;
use crate::domain::ProxyKind;
use crate::ledger::Ledger;
use crate::registry::Registry;
use crate::state::OrgState;
use crate::KERNEL_VERSION;

/// Canonical serialization of OrgState to UTF-8 JSON bytes.
pub fn canonical_serialize(state: &OrgState) -> Vec<u8> {
    build_canonical_value(state).to_string().into_bytes()
}

/// SHA-256 of canonical serialization. Lowercase hex string.
pub fn canonical_hash(state: &OrgState) -> String {
    let digest = Sha256::digest(canonical_serialize(state));
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Field order: kernel_version, nonce, acl, registry, proxies, code,
/// storage, ledger.
fn build_canonical_value(state: &OrgState) -> Value {
    let mut root = Map::new();
    root.insert("kernel_version".to_string(), json!(KERNEL_VERSION));
    root.insert("nonce".to_string(), json!(state.nonce.to_string()));
    root.insert("acl".to_string(), acl_value(&state.acl));
    root.insert("registry".to_string(), registry_value(&state.registry));

    let proxies: Vec<Value> = state
        .proxies
        .values()
        .map(|p| {
            let (kind, implementation) = match p.kind {
                ProxyKind::Kernel { implementation } => ("kernel", Some(implementation)),
                ProxyKind::Upgradeable => ("upgradeable", None),
                ProxyKind::Pinned { implementation } => ("pinned", Some(implementation)),
            };
            let mut m = Map::new();
            m.insert("address".to_string(), json!(p.address));
            m.insert("app_id".to_string(), json!(p.app_id));
            m.insert("kind".to_string(), json!(kind));
            m.insert("implementation".to_string(), json!(implementation));
            Value::Object(m)
        })
        .collect();
    root.insert("proxies".to_string(), Value::Array(proxies));

    let code: Vec<Value> = state
        .code
        .iter()
        .map(|(address, artifact)| {
            let mut m = Map::new();
            m.insert("address".to_string(), json!(address));
            m.insert("artifact".to_string(), json!(artifact));
            Value::Object(m)
        })
        .collect();
    root.insert("code".to_string(), Value::Array(code));

    let storage: Vec<Value> = state
        .storage
        .iter()
        .map(|(proxy, slots)| {
            let mut sorted = Map::new();
            for (k, v) in slots {
                sorted.insert(k.clone(), canonicalize(v));
            }
            let mut m = Map::new();
            m.insert("proxy".to_string(), json!(proxy));
            m.insert("slots".to_string(), Value::Object(sorted));
            Value::Object(m)
        })
        .collect();
    root.insert("storage".to_string(), Value::Array(storage));

    root.insert("ledger".to_string(), ledger_value(&state.ledger));

    Value::Object(root)
}

/// Rebuild `value` with every object's keys in sorted order.
///
/// `serde_json` keeps insertion order under `preserve_order`, so two equal
/// values can otherwise serialize differently.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for k in keys {
                sorted.insert(k.clone(), canonicalize(&obj[k.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn acl_value(acl: &PermissionStore) -> Value {
    let grants: Vec<Value> = acl
        .grants()
        .map(|g| {
            let mut m = Map::new();
            m.insert("resource".to_string(), json!(g.resource));
            m.insert("action".to_string(), json!(g.action));
            m.insert("actor".to_string(), json!(g.actor));
            m.insert("manager".to_string(), json!(g.manager));
            Value::Object(m)
        })
        .collect();
    let mut m = Map::new();
    m.insert("address".to_string(), json!(acl.acl_address()));
    m.insert("grants".to_string(), Value::Array(grants));
    Value::Object(m)
}

fn registry_value(registry: &Registry) -> Value {
    let entries: Vec<Value> = registry
        .entries()
        .map(|e| {
            let mut m = Map::new();
            m.insert("namespace".to_string(), json!(e.namespace));
            m.insert("app_id".to_string(), json!(e.app_id));
            m.insert("implementation".to_string(), json!(e.implementation));
            Value::Object(m)
        })
        .collect();
    let mut m = Map::new();
    m.insert("kernel".to_string(), json!(registry.kernel()));
    m.insert(
        "default_vault".to_string(),
        json!(registry.default_vault_id()),
    );
    m.insert("entries".to_string(), Value::Array(entries));
    Value::Object(m)
}

fn ledger_value(ledger: &Ledger) -> Value {
    let native: Vec<Value> = ledger
        .native_balances()
        .map(|(holder, amount)| balance_value(holder.to_string(), *amount))
        .collect();
    let tokens: Vec<Value> = ledger
        .tokens()
        .map(|(token, record)| {
            let balances: Vec<Value> = record
                .balances
                .iter()
                .map(|(holder, amount)| balance_value(holder.to_string(), *amount))
                .collect();
            let mut m = Map::new();
            m.insert("token".to_string(), json!(token));
            m.insert("supply".to_string(), json!(record.supply.to_string()));
            m.insert("balances".to_string(), Value::Array(balances));
            Value::Object(m)
        })
        .collect();
    let non_receivers: Vec<Value> = ledger.non_receivers().map(|a| json!(a)).collect();

    let mut m = Map::new();
    m.insert(
        "native_supply".to_string(),
        json!(ledger.native_supply().to_string()),
    );
    m.insert("native".to_string(), Value::Array(native));
    m.insert("tokens".to_string(), Value::Array(tokens));
    m.insert("non_receivers".to_string(), Value::Array(non_receivers));
    Value::Object(m)
}

fn balance_value(holder: String, amount: u64) -> Value {
    let mut m = Map::new();
    m.insert("holder".to_string(), Value::String(holder));
    m.insert("amount".to_string(), Value::String(amount.to_string()));
    Value::Object(m)
}
