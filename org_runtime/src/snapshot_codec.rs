//! Snapshot Codec — deterministic OrgState encoder/decoder.
//!
//! Pure codec layer. No side-effects, no timestamps, no envelope.
//!
//! - `encode_snapshot`:  OrgState → compact JSON string
//! - `decode_snapshot`:  JSON string → OrgState (strict, no unknown fields)
//! - `restore_snapshot`: decode + invariant validation
//! - `export_snapshot_to_file` / `import_snapshot_from_file`: file I/O
//! - `snapshot_hash`:    SHA-256 of the encoded JSON (lowercase hex)

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

use org_kernel::invariants::validate_invariants;
use org_kernel::state::OrgState;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// All possible snapshot failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// JSON serialization failed.
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),
    /// JSON deserialization failed (malformed, missing fields, unknown fields).
    #[error("snapshot deserialization failed: {0}")]
    Deserialization(String),
    /// Loaded state violates kernel invariants.
    #[error("snapshot violates invariants: {0}")]
    InvariantViolation(String),
    /// Recorded and recomputed hashes disagree.
    #[error("snapshot {what} hash mismatch: recorded {recorded}, computed {computed}")]
    HashMismatch {
        what: &'static str,
        recorded: String,
        computed: String,
    },
    /// File I/O error.
    #[error("snapshot i/o error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Encode an OrgState to a JSON string.
///
/// Every map in the state is a BTreeMap, so identical states encode to
/// identical bytes. Unlike the canonical hash input, this form is complete
/// (it carries the event log) and can be decoded back.
pub fn encode_snapshot(state: &OrgState) -> Result<String, SnapshotError> {
    serde_json::to_string(state).map_err(|e| SnapshotError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decode a JSON string into an OrgState.
///
/// Strict deserialization: `deny_unknown_fields` on all types rejects
/// unexpected fields, and duplicate grants or registry entries are
/// rejected. No invariant validation — use `restore_snapshot` for
/// validated loading.
pub fn decode_snapshot(json: &str) -> Result<OrgState, SnapshotError> {
    serde_json::from_str::<OrgState>(json)
        .map_err(|e| SnapshotError::Deserialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Restore (decode + validate)
// ---------------------------------------------------------------------------

/// Decode a JSON string and validate invariants immediately.
///
/// This is the safe entry point for loading state from untrusted sources.
pub fn restore_snapshot(json: &str) -> Result<OrgState, SnapshotError> {
    let state = decode_snapshot(json)?;
    validate_invariants(&state).map_err(|e| SnapshotError::InvariantViolation(e.to_string()))?;
    Ok(state)
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Export an OrgState to a file. Creates parent directories if needed.
pub fn export_snapshot_to_file(state: &OrgState, path: &Path) -> Result<(), SnapshotError> {
    let json = encode_snapshot(state)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, json.as_bytes())?;
    Ok(())
}

/// Import an OrgState from a JSON file, validating invariants.
pub fn import_snapshot_from_file(path: &Path) -> Result<OrgState, SnapshotError> {
    let content = fs::read_to_string(path)?;
    restore_snapshot(&content)
}

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// SHA-256 of the encoded JSON. Lowercase hex string.
///
/// This is a file-integrity hash over the full encoding, not the kernel's
/// canonical state hash.
pub fn snapshot_hash(state: &OrgState) -> Result<String, SnapshotError> {
    encode_snapshot(state).map(|json| sha256_hex(json.as_bytes()))
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use org_kernel::domain::Address;
    use org_kernel::engine::OrgEngine;
    use org_kernel::events::{Allocation, Transaction, TxEnvelope};
    use serde_json::{json, Value};

    const ROOT: Address = Address::from_low_u64(1);

    /// Initialized org with one token and some native value.
    fn make_test_state() -> (OrgState, Address) {
        let mut engine = OrgEngine::default();
        engine
            .apply(&TxEnvelope::new(
                1,
                ROOT,
                Transaction::Initialize {
                    root: ROOT,
                    allocations: vec![Allocation {
                        holder: ROOT,
                        amount: 100,
                    }],
                },
            ))
            .unwrap();
        let token = engine
            .apply(&TxEnvelope::new(2, ROOT, Transaction::DeployToken { supply: 10 }))
            .unwrap()
            .created
            .unwrap();
        (engine.state().clone(), token)
    }

    #[test]
    fn roundtrip_produces_identical_json() {
        let (state, _) = make_test_state();
        let json1 = encode_snapshot(&state).unwrap();
        let restored = restore_snapshot(&json1).unwrap();
        assert_eq!(restored, state);
        assert_eq!(encode_snapshot(&restored).unwrap(), json1);
    }

    #[test]
    fn broken_token_supply_returns_invariant_violation() {
        let (state, token) = make_test_state();
        let mut v: Value = serde_json::from_str(&encode_snapshot(&state).unwrap()).unwrap();
        v["ledger"]["tokens"][token.to_string().as_str()]["supply"] = json!(11);

        let err = restore_snapshot(&v.to_string()).unwrap_err();
        match err {
            SnapshotError::InvariantViolation(msg) => {
                assert!(msg.contains("[INVARIANT:token_supply]"), "{}", msg)
            }
            other => panic!("expected InvariantViolation, got {}", other),
        }
    }

    #[test]
    fn unknown_field_returns_deserialization_error() {
        let (state, _) = make_test_state();
        let mut v: Value = serde_json::from_str(&encode_snapshot(&state).unwrap()).unwrap();
        v["surprise"] = json!(true);
        assert!(matches!(
            decode_snapshot(&v.to_string()),
            Err(SnapshotError::Deserialization(_))
        ));
    }

    #[test]
    fn missing_field_returns_deserialization_error() {
        let (state, _) = make_test_state();
        let mut v: Value = serde_json::from_str(&encode_snapshot(&state).unwrap()).unwrap();
        if let Some(obj) = v.as_object_mut() {
            obj.remove("registry");
        }
        assert!(matches!(
            decode_snapshot(&v.to_string()),
            Err(SnapshotError::Deserialization(_))
        ));
    }

    #[test]
    fn file_roundtrip_matches() {
        let (state, _) = make_test_state();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        export_snapshot_to_file(&state, &path).unwrap();
        assert_eq!(import_snapshot_from_file(&path).unwrap(), state);
    }

    #[test]
    fn corrupted_file_returns_deserialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{\"acl\": ").unwrap();
        assert!(matches!(
            import_snapshot_from_file(&path),
            Err(SnapshotError::Deserialization(_))
        ));
    }

    #[test]
    fn hash_is_deterministic() {
        let (a, _) = make_test_state();
        let (b, _) = make_test_state();
        assert_eq!(snapshot_hash(&a).unwrap(), snapshot_hash(&b).unwrap());
    }
}
