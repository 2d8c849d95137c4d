//! Hash-chained JSONL journal.
//!
//! One [`JournalEntry`] per committed write, canonical JSON (keys sorted,
//! compact), one per line. `hash_self` is SHA-256 over the canonical entry
//! with `hash_self` cleared; `hash_prev` links to the previous entry.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use psc_lifecycle::Transition;
use psc_schemas::{Address, Alert, Batch, FdaDecision, IotReading, TransactionRecord, User};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::error;
use uuid::Uuid;

use crate::LedgerError;

/// A state change, self-contained enough to replay without re-validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerOp {
    RegisterUser {
        user: User,
    },
    CreateBatch {
        batch: Batch,
    },
    Transition {
        transition: Transition,
        record: TransactionRecord,
        decision: Option<FdaDecision>,
    },
    AppendReading {
        reading: IotReading,
    },
    AppendAlert {
        alert: Alert,
    },
    ResolveAlert {
        alert_id: u64,
        resolved_by: Address,
        resolved_at: i64,
    },
}

impl LedgerOp {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerOp::RegisterUser { .. } => "register_user",
            LedgerOp::CreateBatch { .. } => "create_batch",
            LedgerOp::Transition { .. } => "transition",
            LedgerOp::AppendReading { .. } => "append_reading",
            LedgerOp::AppendAlert { .. } => "append_alert",
            LedgerOp::ResolveAlert { .. } => "resolve_alert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub op: LedgerOp,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

impl JournalEntry {
    /// Build the next entry in a chain whose head is `prev_hash`.
    pub(crate) fn seal(
        seq: u64,
        prev_hash: Option<&str>,
        op: LedgerOp,
    ) -> Result<Self, LedgerError> {
        let entry_id = derive_entry_id(prev_hash, &op, seq)?;
        let mut entry = JournalEntry {
            entry_id,
            seq,
            ts_utc: Utc::now(),
            op,
            hash_prev: prev_hash.map(str::to_string),
            hash_self: None,
        };
        entry.hash_self = Some(compute_entry_hash(&entry)?);
        Ok(entry)
    }

    pub fn tx_hash(&self) -> &str {
        self.hash_self.as_deref().unwrap_or_default()
    }
}

/// Deterministic id from chain position and content. No RNG, so replaying a
/// journal reproduces the same ids.
fn derive_entry_id(prev_hash: Option<&str>, op: &LedgerOp, seq: u64) -> Result<Uuid, LedgerError> {
    let mut h = Sha256::new();
    h.update(prev_hash.unwrap_or("").as_bytes());
    h.update(b"|");
    h.update(seq.to_be_bytes());
    h.update(b"|");
    h.update(canonical_json_line(op)?.as_bytes());
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &h.finalize()))
}

pub fn compute_entry_hash(entry: &JournalEntry) -> Result<String, LedgerError> {
    let mut clone = entry.clone();
    clone.hash_self = None;
    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

pub(crate) fn canonical_json_line<T: Serialize>(v: &T) -> Result<String, LedgerError> {
    let raw = serde_json::to_value(v)
        .map_err(|e| LedgerError::Journal(format!("serialize entry: {e}")))?;
    serde_json::to_string(&sort_keys(&raw))
        .map_err(|e| LedgerError::Journal(format!("stringify entry: {e}")))
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Append-only journal file.
///
/// A failed append is rolled back to the previous length so the file never
/// holds a line the in-memory head has not applied. If the rollback itself
/// fails the file is poisoned and every later append is refused.
#[derive(Debug)]
pub(crate) struct JournalFile {
    path: PathBuf,
    poisoned: bool,
    #[cfg(test)]
    pub(crate) fault: Option<Fault>,
}

/// Injected append failure.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Write the whole line, then fail the sync.
    Sync,
    /// Write half the line, then fail.
    TornWrite,
    /// Torn write whose rollback also fails.
    Stuck,
}

impl JournalFile {
    /// Open (creating parent dirs) and return every verified entry on disk.
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<JournalEntry>), LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Journal(format!("create_dir_all {parent:?}: {e}")))?;
        }
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| LedgerError::Journal(format!("read {path:?}: {e}")))?;
            scan(&content)?
        } else {
            Vec::new()
        };
        Ok((
            Self {
                path,
                poisoned: false,
                #[cfg(test)]
                fault: None,
            },
            entries,
        ))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn append(&mut self, entry: &JournalEntry) -> Result<(), LedgerError> {
        if self.poisoned {
            return Err(LedgerError::Journal(format!(
                "{:?} poisoned by a failed rollback; restart to replay",
                self.path
            )));
        }
        let mut line = canonical_json_line(entry)?;
        line.push('\n');
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::Journal(format!("open {:?}: {e}", self.path)))?;
        let start = f
            .metadata()
            .map_err(|e| LedgerError::Journal(format!("stat {:?}: {e}", self.path)))?
            .len();

        #[cfg(test)]
        let stuck = matches!(self.fault, Some(Fault::Stuck));
        #[cfg(not(test))]
        let stuck = false;

        let written = self.write_line(&mut f, line.as_bytes());
        if written.is_err() {
            let undo = if stuck {
                Err(io::Error::other("injected rollback failure"))
            } else {
                f.set_len(start).and_then(|()| f.sync_data())
            };
            if let Err(undo) = undo {
                self.poisoned = true;
                error!(
                    path = ?self.path,
                    seq = entry.seq,
                    error = %undo,
                    "journal rollback failed; refusing further appends"
                );
            }
        }
        written
    }

    fn write_line(&mut self, f: &mut File, bytes: &[u8]) -> Result<(), LedgerError> {
        #[cfg(test)]
        if let Some(fault) = self.fault.take() {
            let n = match fault {
                Fault::Sync => bytes.len(),
                Fault::TornWrite | Fault::Stuck => bytes.len() / 2,
            };
            f.write_all(&bytes[..n])
                .map_err(|e| LedgerError::Journal(format!("write {:?}: {e}", self.path)))?;
            return Err(LedgerError::Journal(format!(
                "injected {fault:?} failure on {:?}",
                self.path
            )));
        }
        f.write_all(bytes)
            .map_err(|e| LedgerError::Journal(format!("write {:?}: {e}", self.path)))?;
        f.sync_data()
            .map_err(|e| LedgerError::Journal(format!("sync {:?}: {e}", self.path)))
    }
}

/// Parse and verify journal content. Any defect is reported as
/// [`LedgerError::Corrupt`] with its 1-based line number.
fn scan(content: &str) -> Result<Vec<JournalEntry>, LedgerError> {
    let mut prev_hash: Option<String> = None;
    let mut entries = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line_no = i + 1;
        let corrupt = |reason: String| LedgerError::Corrupt {
            line: line_no,
            reason,
        };

        let entry: JournalEntry = serde_json::from_str(trimmed)
            .map_err(|e| corrupt(format!("unparseable entry: {e}")))?;

        if entry.seq != entries.len() as u64 {
            return Err(corrupt(format!(
                "seq gap: expected {}, got {}",
                entries.len(),
                entry.seq
            )));
        }

        if entry.hash_prev != prev_hash {
            return Err(corrupt(format!(
                "hash_prev mismatch: expected {:?}, got {:?}",
                prev_hash, entry.hash_prev
            )));
        }

        let Some(claimed) = entry.hash_self.clone() else {
            return Err(corrupt("missing hash_self".to_string()));
        };
        let recomputed = compute_entry_hash(&entry)?;
        if claimed != recomputed {
            return Err(corrupt(format!(
                "hash_self mismatch: claimed {claimed}, recomputed {recomputed}"
            )));
        }

        prev_hash = Some(claimed);
        entries.push(entry);
    }

    Ok(entries)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

/// Verify a journal file without opening a ledger on it.
pub fn verify_journal(path: impl AsRef<Path>) -> Result<VerifyResult, LedgerError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| LedgerError::Journal(format!("read {path:?}: {e}")))?;
    verify_journal_str(&content)
}

pub fn verify_journal_str(content: &str) -> Result<VerifyResult, LedgerError> {
    match scan(content) {
        Ok(entries) => Ok(VerifyResult::Valid {
            lines: entries.len(),
        }),
        Err(LedgerError::Corrupt { line, reason }) => Ok(VerifyResult::Broken { line, reason }),
        Err(e) => Err(e),
    }
}
