//! psc-ledger
//!
//! The custody ledger collaborator: users, batches, custody transactions,
//! IoT readings and alerts behind one object-safe [`Ledger`] trait.
//!
//! [`MemoryLedger`] is the shipped implementation. Every write is one
//! hash-chained entry; when opened with a journal path the entry is appended
//! to disk before state changes, and reopening replays the journal.

mod error;
mod journal;
mod memory;

use std::collections::BTreeMap;

use psc_lifecycle::TransitionPlan;
use psc_schemas::{
    Address, Alert, AlertType, Batch, BatchStatus, FdaDecision, IotReading, Role, TransactionRecord,
    User,
};
use serde::{Deserialize, Serialize};

pub use error::LedgerError;
pub use journal::{verify_journal, verify_journal_str, JournalEntry, LedgerOp, VerifyResult};
pub use memory::MemoryLedger;

/// Proof of a committed write: its position in the total order and the hash
/// of the entry that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub seq: u64,
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub address: Address,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub batch_id: String,
    pub drug_name: String,
    pub creator: Address,
}

/// A validated transition plus the free-text fields of its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionWrite {
    pub plan: TransitionPlan,
    pub location: String,
    pub remarks: String,
}

/// A sensor reading already converted to wire units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReading {
    pub batch_id: String,
    pub location: String,
    pub temperature_centi: i32,
    pub humidity: u32,
    pub pressure: u32,
    pub tamper_detected: bool,
    pub recorded_by: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub batch_id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub raised_by: Address,
}

/// Outcome of [`Ledger::resolve_alert`]. `receipt` is `None` when the alert
/// was already resolved and nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub alert: Alert,
    pub receipt: Option<Receipt>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerCounts {
    pub users: usize,
    pub batches: usize,
    pub transactions: usize,
    pub readings: usize,
    pub alerts: usize,
    pub unresolved_alerts: usize,
    /// Keyed by status code.
    pub batches_by_status: BTreeMap<u8, usize>,
}

impl LedgerCounts {
    pub fn with_status(&self, status: BatchStatus) -> usize {
        self.batches_by_status
            .get(&status.code())
            .copied()
            .unwrap_or(0)
    }
}

/// The custody ledger.
///
/// Writes are totally ordered. Reads reflect every write that returned
/// before the read began. `append_transaction` re-checks the plan's expected
/// status and owner under the write lock, so of two racing identical
/// transitions exactly one commits.
pub trait Ledger: Send + Sync {
    fn get_user(&self, address: &Address) -> Result<Option<User>, LedgerError>;
    fn register_user(&self, user: NewUser) -> Result<(User, Receipt), LedgerError>;
    fn list_users(&self) -> Result<Vec<User>, LedgerError>;

    fn get_batch(&self, batch_id: &str) -> Result<Option<Batch>, LedgerError>;
    fn create_batch(&self, batch: NewBatch) -> Result<(Batch, Receipt), LedgerError>;
    fn list_batches(&self) -> Result<Vec<Batch>, LedgerError>;

    /// Commit a transition. Approve and reject also store the FDA decision in
    /// the same entry.
    fn append_transaction(
        &self,
        write: TransitionWrite,
    ) -> Result<(TransactionRecord, Receipt), LedgerError>;
    /// Custody history in append order.
    fn list_transactions_for_batch(
        &self,
        batch_id: &str,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;
    /// The `limit` most recent records, newest first.
    fn list_all_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>, LedgerError>;

    fn append_reading(&self, reading: NewReading) -> Result<(IotReading, Receipt), LedgerError>;
    fn list_readings_for_batch(&self, batch_id: &str) -> Result<Vec<IotReading>, LedgerError>;

    fn append_alert(&self, alert: NewAlert) -> Result<(Alert, Receipt), LedgerError>;
    fn get_alert(&self, id: u64) -> Result<Option<Alert>, LedgerError>;
    fn list_alerts(&self) -> Result<Vec<Alert>, LedgerError>;
    fn list_alerts_for_batch(&self, batch_id: &str) -> Result<Vec<Alert>, LedgerError>;
    /// Idempotent: resolving an already-resolved alert keeps the first
    /// resolver and writes nothing.
    fn resolve_alert(&self, id: u64, by: &Address) -> Result<Resolution, LedgerError>;

    fn get_fda_decision(&self, batch_id: &str) -> Result<Option<FdaDecision>, LedgerError>;

    fn counts(&self) -> Result<LedgerCounts, LedgerError>;
}
