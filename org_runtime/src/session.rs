//! Session manager — isolated sessions with persist-after-apply semantics.
//!
//! Each session gets its own directory with a transaction log and snapshots.
//! Concurrency: Mutex for write serialization, no global mutable state.
//!
//! Stage-persist-commit order:
//!   1. kernel stages env   — a rejection leaves engine and log untouched
//!   2. event_store.append  — a failure discards the staged state
//!   3. commit, then snapshot if interval reached

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use org_kernel::apps::CodeLibrary;
use org_kernel::domain::{Address, Receipt};
use org_kernel::engine::OrgEngine;
use org_kernel::events::{Transaction, TxEnvelope};
use org_kernel::hashing::canonical_hash;
use org_kernel::state::OrgState;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::event_store::EventStore;
use crate::replay;
use crate::snapshot;

/// An isolated organization session with its own log and state.
#[derive(Debug)]
pub struct Session {
    session_id: String,
    dir: PathBuf,
    engine: OrgEngine,
    event_store: EventStore,
    snapshot_interval: u64,
}

impl Session {
    /// Open (or create) a session in `base_dir`.
    ///
    /// Directory structure:
    ///   <base_dir>/<session_id>/transactions.log
    ///   <base_dir>/<session_id>/snapshots/
    ///
    /// An existing log is replayed, starting from the newest snapshot that
    /// verifies; a snapshot that fails verification is skipped.
    pub fn open(
        base_dir: &Path,
        session_id: &str,
        snapshot_interval: u64,
        library: CodeLibrary,
    ) -> Result<Self, RuntimeError> {
        let dir = base_dir.join(session_id);
        let event_store = EventStore::open(&dir.join("transactions.log"))?;
        let last_seq = event_store.last_sequence();

        let engine = if last_seq > 0 {
            let envs = event_store.load_transactions()?;
            Self::recover(&dir.join("snapshots"), &library, last_seq, &envs)?
        } else {
            OrgEngine::new(library)
        };

        info!(session = session_id, sequence = last_seq, "session opened");
        Ok(Self {
            session_id: session_id.to_string(),
            dir,
            engine,
            event_store,
            snapshot_interval,
        })
    }

    /// Open a session as described by `config`. A fresh session with
    /// `[genesis]` configured is initialized immediately.
    pub fn open_with_config(
        config: &RuntimeConfig,
        session_id: &str,
        library: CodeLibrary,
    ) -> Result<Self, RuntimeError> {
        let mut session = Self::open(
            &config.data_dir,
            session_id,
            config.snapshot_interval,
            library,
        )?;
        if session.current_sequence() == 0 {
            if let Some(env) = config.genesis_envelope() {
                session.apply(&env)?;
            }
        }
        Ok(session)
    }

    fn recover(
        snap_dir: &Path,
        library: &CodeLibrary,
        last_seq: u64,
        envs: &[TxEnvelope],
    ) -> Result<OrgEngine, RuntimeError> {
        if let Some(snap) = snapshot::load_latest_snapshot(snap_dir, last_seq)? {
            match snapshot::verify_snapshot(&snap) {
                Ok(state) => {
                    return Ok(replay::rebuild_from(library, state, snap.sequence, envs)?);
                }
                Err(e) => warn!(
                    sequence = snap.sequence,
                    error = %e,
                    "snapshot failed verification, replaying full log"
                ),
            }
        }
        let mut engine = OrgEngine::new(library.clone());
        engine.apply_sequence(envs)?;
        Ok(engine)
    }

    /// Apply a single transaction: stage via kernel, persist, then commit.
    pub fn apply(&mut self, env: &TxEnvelope) -> Result<Receipt, RuntimeError> {
        // Steps 1-2: the staged state is committed only once the log append
        // succeeds, so engine and log never diverge.
        let store = &mut self.event_store;
        let receipt = self
            .engine
            .apply_with(env, |env, _| store.append(env))?;

        // Step 3: auto-snapshot at interval
        if self.snapshot_interval > 0 && env.sequence % self.snapshot_interval == 0 {
            snapshot::save_snapshot(&self.snapshot_dir(), env.sequence, self.engine.state())?;
        }

        Ok(receipt)
    }

    /// Wrap `tx` in the next envelope and apply it.
    pub fn submit(&mut self, sender: Address, tx: Transaction) -> Result<Receipt, RuntimeError> {
        let env = TxEnvelope::new(self.current_sequence() + 1, sender, tx);
        self.apply(&env)
    }

    /// Full replay from the log, ignoring snapshots. Resets the engine to
    /// the replayed state.
    pub fn replay_full(&mut self) -> Result<(OrgState, String), RuntimeError> {
        let envs = self.event_store.load_transactions()?;
        let mut engine = OrgEngine::new(self.engine.library().clone());
        engine.apply_sequence(&envs)?;

        let state = engine.state().clone();
        let hash = canonical_hash(&state);
        info!(session = %self.session_id, transactions = envs.len(), hash = %hash, "full replay complete");
        self.engine = engine;
        Ok((state, hash))
    }

    /// Snapshot the current state now.
    pub fn snapshot_now(&self) -> Result<PathBuf, RuntimeError> {
        Ok(snapshot::save_snapshot(
            &self.snapshot_dir(),
            self.current_sequence(),
            self.engine.state(),
        )?)
    }

    pub fn state(&self) -> &OrgState {
        self.engine.state()
    }

    pub fn current_hash(&self) -> String {
        canonical_hash(self.engine.state())
    }

    pub fn current_sequence(&self) -> u64 {
        self.engine.last_sequence()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_dir(&self) -> PathBuf {
        self.dir.join("snapshots")
    }
}

/// Thread-safe session handle using Mutex.
#[derive(Debug)]
pub struct SharedSession {
    inner: Mutex<Session>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    /// Apply under lock.
    pub fn apply(&self, env: &TxEnvelope) -> Result<Receipt, RuntimeError> {
        self.inner
            .lock()
            .map_err(|_| RuntimeError::Poisoned)?
            .apply(env)
    }

    /// Assign the next sequence and apply, atomically with respect to other
    /// callers.
    pub fn submit(&self, sender: Address, tx: Transaction) -> Result<Receipt, RuntimeError> {
        self.inner
            .lock()
            .map_err(|_| RuntimeError::Poisoned)?
            .submit(sender, tx)
    }

    pub fn current_hash(&self) -> Result<String, RuntimeError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| RuntimeError::Poisoned)?
            .current_hash())
    }

    pub fn current_sequence(&self) -> Result<u64, RuntimeError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| RuntimeError::Poisoned)?
            .current_sequence())
    }

    pub fn into_inner(self) -> Result<Session, RuntimeError> {
        self.inner.into_inner().map_err(|_| RuntimeError::Poisoned)
    }
}
