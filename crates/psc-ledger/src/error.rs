use std::fmt;

use psc_schemas::{Address, BatchStatus, CoreError};

/// Ledger-level failure. Converts into [`CoreError`] at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    NotFound(String),
    AlreadyExists(String),
    /// The write's expected status/owner no longer holds. Another writer won.
    StalePrecondition {
        batch_id: String,
        expected_status: BatchStatus,
        actual_status: BatchStatus,
        expected_owner: Address,
        actual_owner: Address,
    },
    /// The actor is not registered, inactive, or lacks the role the write needs.
    Unauthorized(String),
    Invalid(String),
    /// Journal could not be written or read. Nothing was applied.
    Journal(String),
    /// Journal on disk fails verification.
    Corrupt { line: usize, reason: String },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NotFound(what) => write!(f, "{what} not found"),
            LedgerError::AlreadyExists(what) => write!(f, "{what} already exists"),
            LedgerError::StalePrecondition {
                batch_id,
                expected_status,
                actual_status,
                expected_owner,
                actual_owner,
            } => write!(
                f,
                "batch {batch_id} changed concurrently: expected {} owned by {expected_owner}, found {} owned by {actual_owner}",
                expected_status.label(),
                actual_status.label()
            ),
            LedgerError::Unauthorized(msg) => f.write_str(msg),
            LedgerError::Invalid(msg) => f.write_str(msg),
            LedgerError::Journal(msg) => write!(f, "journal unavailable: {msg}"),
            LedgerError::Corrupt { line, reason } => {
                write!(f, "journal corrupt at line {line}: {reason}")
            }
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<LedgerError> for CoreError {
    fn from(e: LedgerError) -> Self {
        let msg = e.to_string();
        match e {
            LedgerError::NotFound(_) => CoreError::not_found(msg),
            LedgerError::AlreadyExists(_) => CoreError::already_exists(msg),
            LedgerError::StalePrecondition { .. } => CoreError::invalid_state(msg),
            LedgerError::Unauthorized(_) => CoreError::unauthorized(msg),
            LedgerError::Invalid(_) => CoreError::validation(msg),
            LedgerError::Journal(_) | LedgerError::Corrupt { .. } => {
                CoreError::ledger_unavailable(msg)
            }
        }
    }
}
