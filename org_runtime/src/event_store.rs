//! Append-only transaction log — binary protobuf frames.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only — no mutation, no deletion, no reordering
//!   - fsync after every write
//!   - Sequence strictly increasing (validated on append and on load)
//!   - Only transactions the kernel committed are ever appended

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::debug;

use org_kernel::events::TxEnvelope;

use crate::error::RuntimeError;
use crate::proto_bridge::{proto_to_tx, tx_to_proto};
use crate::proto_types::ProtoTxEnvelope;

/// Frames larger than this are treated as corruption.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Append-only transaction log backed by a binary file.
#[derive(Debug)]
pub struct EventStore {
    path: PathBuf,
    last_sequence: u64,
}

impl EventStore {
    /// Open or create a log at the given path.
    /// Reads existing frames to determine the last sequence number.
    pub fn open(path: &Path) -> Result<Self, RuntimeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let last_sequence = if path.exists() {
            Self::read_all_from_file(path)?
                .last()
                .map(|e| e.sequence)
                .unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
        })
    }

    /// Append a single committed transaction.
    ///
    /// Validates strict sequence ordering, writes one frame and fsyncs.
    pub fn append(&mut self, env: &TxEnvelope) -> Result<(), RuntimeError> {
        self.append_proto(&tx_to_proto(env))
    }

    /// Append an already-encoded envelope.
    pub fn append_proto(&mut self, frame: &ProtoTxEnvelope) -> Result<(), RuntimeError> {
        let expected = self.last_sequence + 1;
        if frame.sequence != expected {
            return Err(RuntimeError::LogSequence {
                expected,
                got: frame.sequence,
            });
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let buf = frame.encode_to_vec();
        let len = u32::try_from(buf.len()).map_err(|_| {
            RuntimeError::CorruptLog(format!("frame of {} bytes is too large", buf.len()))
        })?;

        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;

        self.last_sequence = frame.sequence;
        debug!(sequence = frame.sequence, bytes = buf.len(), "appended frame");
        Ok(())
    }

    /// Load all raw frames in sequence order.
    pub fn load_all(&self) -> Result<Vec<ProtoTxEnvelope>, RuntimeError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Self::read_all_from_file(&self.path)
    }

    /// Load and decode all transactions in sequence order.
    pub fn load_transactions(&self) -> Result<Vec<TxEnvelope>, RuntimeError> {
        self.load_all()?
            .iter()
            .map(|p| proto_to_tx(p).map_err(RuntimeError::from))
            .collect()
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all frames from a file, validating frame integrity and order.
    fn read_all_from_file(path: &Path) -> Result<Vec<ProtoTxEnvelope>, RuntimeError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut frames: Vec<ProtoTxEnvelope> = Vec::new();
        let mut len_buf = [0u8; 4];

        loop {
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                return Err(RuntimeError::CorruptLog(format!(
                    "invalid frame length {} after {} frame(s)",
                    len,
                    frames.len()
                )));
            }

            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).map_err(|e| {
                RuntimeError::CorruptLog(format!(
                    "truncated frame after {} frame(s): {}",
                    frames.len(),
                    e
                ))
            })?;

            let frame = ProtoTxEnvelope::decode(buf.as_slice()).map_err(|e| {
                RuntimeError::CorruptLog(format!("protobuf decode error: {}", e))
            })?;

            let expected = frames.last().map(|f| f.sequence + 1).unwrap_or(1);
            if frame.sequence != expected {
                return Err(RuntimeError::CorruptLog(format!(
                    "frame sequence {} where {} was expected",
                    frame.sequence, expected
                )));
            }

            frames.push(frame);
        }

        Ok(frames)
    }
}
