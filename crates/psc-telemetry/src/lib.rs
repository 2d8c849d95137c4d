//! psc-telemetry
//!
//! Off-chain sensor handling: threshold policies, per-reading evaluation,
//! ambient fan-out across undispensed batches, a cancellable periodic push loop,
//! and a sensor simulator for demos.

mod evaluator;
mod fanout;
mod monitor;
mod policy;
pub mod simulator;

pub use evaluator::{Evaluation, SensorInput, TelemetryEvaluator};
pub use fanout::{AmbientDefaults, AmbientReading, BatchOutcome, FanOutReport, SkippedBatch};
pub use monitor::{spawn_monitor, MonitorHandle};
pub use policy::{Band, PolicyKind, ThresholdPolicy, Violation};
