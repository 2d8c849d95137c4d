//! psc-schemas
//!
//! Shared domain records for the supply-chain tracker: actors, batches,
//! custody transactions, IoT readings, alerts and FDA decisions, plus the
//! integer codes and wire encodings the ledger collaborator speaks.
//!
//! No IO and no business rules live here. The lifecycle rules are in
//! `psc-lifecycle`; threshold policy is in `psc-telemetry`.

mod address;
mod codes;
mod error;
mod records;
pub mod wire;

pub use address::Address;
pub use codes::{AlertType, BatchStatus, Role};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use records::{Alert, Batch, FdaDecision, IotReading, TransactionRecord, User};
