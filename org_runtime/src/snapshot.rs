//! Snapshot layer — deterministic, restorable state snapshots.
//!
//! A snapshot file carries the encoded state, its integrity hash and the
//! kernel's canonical hash. No timestamps in snapshot content.
//!
//! If a snapshot fails verification, the session falls back to full replay.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use org_kernel::hashing::canonical_hash;
use org_kernel::state::OrgState;
use org_kernel::KERNEL_VERSION;

use crate::snapshot_codec::{encode_snapshot, restore_snapshot, sha256_hex, SnapshotError};

/// Snapshot on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    /// Sequence number of the last transaction folded into `state_json`.
    pub sequence: u64,
    /// Full encoded state (see `snapshot_codec::encode_snapshot`).
    pub state_json: String,
    /// SHA-256 of `state_json`.
    pub state_hash: String,
    /// Kernel canonical hash of the state.
    pub canonical_hash: String,
    /// Kernel version at snapshot time.
    pub kernel_version: u32,
}

fn snapshot_path(dir: &Path, sequence: u64) -> PathBuf {
    dir.join(format!("snapshot_{:06}.json", sequence))
}

/// Save a deterministic snapshot of the current state.
pub fn save_snapshot(dir: &Path, sequence: u64, state: &OrgState) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(dir)?;

    let state_json = encode_snapshot(state)?;
    let snap = Snapshot {
        sequence,
        state_hash: sha256_hex(state_json.as_bytes()),
        canonical_hash: canonical_hash(state),
        state_json,
        kernel_version: KERNEL_VERSION,
    };

    let path = snapshot_path(dir, sequence);
    let content =
        serde_json::to_string(&snap).map_err(|e| SnapshotError::Serialization(e.to_string()))?;

    let mut file = File::create(&path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    info!(sequence, hash = %snap.canonical_hash, path = %path.display(), "snapshot saved");
    Ok(path)
}

/// Load a snapshot at a specific sequence number.
/// Returns None if no snapshot exists at that sequence.
pub fn load_snapshot(dir: &Path, sequence: u64) -> Result<Option<Snapshot>, SnapshotError> {
    let path = snapshot_path(dir, sequence);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)?;
    let snap = serde_json::from_str(&content)
        .map_err(|e| SnapshotError::Deserialization(format!("{}: {}", path.display(), e)))?;
    Ok(Some(snap))
}

/// Sequence numbers of every snapshot in `dir`, ascending.
pub fn list_snapshots(dir: &Path) -> Result<Vec<u64>, SnapshotError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut seqs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if let Some(seq) = name
            .strip_prefix("snapshot_")
            .and_then(|s| s.strip_suffix(".json"))
            .and_then(|s| s.parse::<u64>().ok())
        {
            seqs.push(seq);
        }
    }
    seqs.sort_unstable();
    Ok(seqs)
}

/// Load the latest snapshot at or below `max_sequence`.
pub fn load_latest_snapshot(dir: &Path, max_sequence: u64) -> Result<Option<Snapshot>, SnapshotError> {
    match list_snapshots(dir)?
        .into_iter()
        .filter(|s| *s <= max_sequence)
        .last()
    {
        Some(seq) => load_snapshot(dir, seq),
        None => Ok(None),
    }
}

/// Verify a snapshot end to end and return the state it holds.
///
/// Checks the integrity hash, decodes strictly, validates invariants and
/// recomputes the canonical hash.
pub fn verify_snapshot(snap: &Snapshot) -> Result<OrgState, SnapshotError> {
    let computed = sha256_hex(snap.state_json.as_bytes());
    if computed != snap.state_hash {
        return Err(SnapshotError::HashMismatch {
            what: "integrity",
            recorded: snap.state_hash.clone(),
            computed,
        });
    }

    let state = restore_snapshot(&snap.state_json)?;

    let computed = canonical_hash(&state);
    if computed != snap.canonical_hash {
        return Err(SnapshotError::HashMismatch {
            what: "canonical",
            recorded: snap.canonical_hash.clone(),
            computed,
        });
    }
    Ok(state)
}
