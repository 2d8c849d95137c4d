//! Ambient fan-out: one room/bench reading applied to every batch not yet dispensed.

use psc_schemas::wire::SensorLocation;
use psc_schemas::{Address, BatchStatus, CoreError, CoreResult, ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{SensorInput, TelemetryEvaluator, ThresholdPolicy};

/// A reading with no batch attached. Missing fields take [`AmbientDefaults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbientReading {
    pub temperature: f64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientDefaults {
    pub location: String,
    pub humidity: f64,
    pub pressure: f64,
}

impl Default for AmbientDefaults {
    fn default() -> Self {
        Self {
            location: "Lab".to_string(),
            humidity: 0.0,
            pressure: 101.0,
        }
    }
}

impl AmbientReading {
    /// Fill gaps from `defaults`. Empty strings count as missing.
    pub fn resolve(&self, defaults: &AmbientDefaults) -> (String, f64, f64) {
        let location = self
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(&defaults.location)
            .to_string();
        (
            location,
            self.humidity.unwrap_or(defaults.humidity),
            self.pressure.unwrap_or(defaults.pressure),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub batch_id: String,
    pub reading_id: u64,
    pub alerts_raised: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedBatch {
    pub batch_id: String,
    pub kind: ErrorKind,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    pub evaluated: Vec<BatchOutcome>,
    pub skipped: Vec<SkippedBatch>,
}

impl FanOutReport {
    pub fn alerts_raised(&self) -> usize {
        self.evaluated.iter().map(|o| o.alerts_raised).sum()
    }
}

impl TelemetryEvaluator {
    /// Apply `ambient` to every batch not yet Dispensed (FdaRejected
    /// included), each evaluated on its own.
    ///
    /// Malformed ambient values fail the whole call before any write. After
    /// that, a failing batch is recorded in the report and skipped; the
    /// others still get their reading.
    pub fn fan_out(
        &self,
        ambient: &AmbientReading,
        defaults: &AmbientDefaults,
        policy: &ThresholdPolicy,
        raised_by: &Address,
    ) -> CoreResult<FanOutReport> {
        if !ambient.temperature.is_finite() {
            return Err(CoreError::validation("temperature must be a finite number"));
        }
        let (location, humidity, pressure) = ambient.resolve(defaults);
        psc_schemas::wire::humidity_to_wire(humidity)?;
        psc_schemas::wire::pressure_to_wire(pressure)?;

        let batches = self.ledger().list_batches()?;
        let mut report = FanOutReport::default();

        for batch in batches.into_iter().filter(|b| b.status.code() < BatchStatus::Dispensed.code()) {
            let input = SensorInput {
                batch_id: batch.batch_id.clone(),
                location: SensorLocation::named(location.clone()),
                temperature: ambient.temperature,
                humidity,
                pressure,
                tamper_detected: false,
            };
            match self.submit(&input, policy, raised_by) {
                Ok(ev) => report.evaluated.push(BatchOutcome {
                    batch_id: batch.batch_id,
                    reading_id: ev.reading.id,
                    alerts_raised: ev.alerts.len(),
                }),
                Err(e) => {
                    warn!(batch_id = %batch.batch_id, error = %e, "fan-out skipped batch");
                    report.skipped.push(SkippedBatch {
                        batch_id: batch.batch_id,
                        kind: e.kind,
                        error: e.message,
                    });
                }
            }
        }

        info!(
            policy = %policy.kind,
            temperature = ambient.temperature,
            evaluated = report.evaluated.len(),
            skipped = report.skipped.len(),
            alerts = report.alerts_raised(),
            "ambient reading fanned out"
        );
        Ok(report)
    }
}
