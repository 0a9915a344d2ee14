//! Replay orchestrator — rebuild state from the transaction log.
//!
//! Delegates all domain logic to the kernel engine.
//! No shortcuts, no cached state logic.

use tracing::info;

use org_kernel::apps::CodeLibrary;
use org_kernel::engine::OrgEngine;
use org_kernel::events::TxEnvelope;
use org_kernel::hashing::canonical_hash;
use org_kernel::state::OrgState;
use org_kernel::KernelError;

/// Rebuild the organization state from a sequence of transactions.
///
/// 1. Create a fresh engine over `library`
/// 2. Pass each transaction sequentially to the kernel
/// 3. Return (final_state, canonical_hash)
///
/// A logged transaction that the kernel now rejects is an error: the log
/// only ever holds committed transactions.
pub fn rebuild_state(
    library: &CodeLibrary,
    envs: &[TxEnvelope],
) -> Result<(OrgState, String), KernelError> {
    let mut engine = OrgEngine::new(library.clone());
    engine.apply_sequence(envs)?;

    let state = engine.state().clone();
    let hash = canonical_hash(&state);
    info!(transactions = envs.len(), hash = %hash, "replay complete");
    Ok((state, hash))
}

/// Rebuild state and return only the canonical hash.
pub fn rebuild_hash(library: &CodeLibrary, envs: &[TxEnvelope]) -> Result<String, KernelError> {
    rebuild_state(library, envs).map(|(_, hash)| hash)
}

/// Continue from a restored state: apply only the transactions after
/// `from_sequence`.
pub fn rebuild_from(
    library: &CodeLibrary,
    state: OrgState,
    from_sequence: u64,
    envs: &[TxEnvelope],
) -> Result<OrgEngine, KernelError> {
    let mut engine = OrgEngine::from_state(library.clone(), state, from_sequence);
    let tail: Vec<&TxEnvelope> = envs.iter().filter(|e| e.sequence > from_sequence).collect();
    for env in &tail {
        engine.apply(env)?;
    }
    info!(
        from = from_sequence,
        applied = tail.len(),
        "replay from snapshot complete"
    );
    Ok(engine)
}
