use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure categories surfaced to every caller (API, CLI, tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Batch, user or alert absent.
    NotFound,
    /// Role or ownership mismatch, or an unknown credential.
    Unauthorized,
    /// Transition attempted from the wrong status (including terminal states).
    InvalidState,
    /// Duplicate registration or batch id.
    AlreadyExists,
    /// Malformed input.
    ValidationError,
    /// Ledger collaborator unreachable or its journal unwritable.
    LedgerUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::LedgerUnavailable => "ledger_unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure returned by every core operation.
///
/// A `CoreError` always means nothing was mutated. Callers decide whether to
/// resubmit; the core never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn ledger_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LedgerUnavailable, message)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CoreError {}
