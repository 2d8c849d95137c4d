use std::sync::Arc;

use psc_ledger::{Ledger, NewAlert, NewReading, Receipt};
use psc_schemas::wire::{celsius_to_centi, humidity_to_wire, pressure_to_wire, SensorLocation};
use psc_schemas::{Address, Alert, CoreError, CoreResult, IotReading};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ThresholdPolicy;

/// A sensor submission in natural units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorInput {
    pub batch_id: String,
    pub location: SensorLocation,
    /// °C
    pub temperature: f64,
    /// %
    pub humidity: f64,
    /// kPa
    pub pressure: f64,
    pub tamper_detected: bool,
}

/// Result of one submission: the stored reading and every alert it raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub reading: IotReading,
    pub alerts: Vec<Alert>,
    pub receipt: Receipt,
}

#[derive(Clone)]
pub struct TelemetryEvaluator {
    ledger: Arc<dyn Ledger>,
}

impl TelemetryEvaluator {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Append exactly one reading for `input.batch_id`, then one alert per
    /// dimension `policy` flags. Input is validated and converted before
    /// anything is written.
    pub fn submit(
        &self,
        input: &SensorInput,
        policy: &ThresholdPolicy,
        raised_by: &Address,
    ) -> CoreResult<Evaluation> {
        if input.batch_id.trim().is_empty() {
            return Err(CoreError::validation("batchId must not be empty"));
        }
        let temperature_centi = celsius_to_centi(input.temperature)?;
        let humidity = humidity_to_wire(input.humidity)?;
        let pressure = pressure_to_wire(input.pressure)?;

        if self.ledger.get_batch(&input.batch_id)?.is_none() {
            return Err(CoreError::not_found(format!("batch {}", input.batch_id)));
        }

        let (reading, receipt) = self.ledger.append_reading(NewReading {
            batch_id: input.batch_id.clone(),
            location: input.location.encode(),
            temperature_centi,
            humidity,
            pressure,
            tamper_detected: input.tamper_detected,
            recorded_by: raised_by.clone(),
        })?;

        let mut alerts = Vec::new();
        for v in policy.violations(
            input.temperature,
            input.humidity,
            input.pressure,
            input.tamper_detected,
        ) {
            warn!(
                batch_id = %input.batch_id,
                policy = %policy.kind,
                alert_type = v.alert_type.label(),
                "{}",
                v.message
            );
            let (alert, _) = self.ledger.append_alert(NewAlert {
                batch_id: input.batch_id.clone(),
                alert_type: v.alert_type,
                message: v.message,
                raised_by: raised_by.clone(),
            })?;
            alerts.push(alert);
        }

        Ok(Evaluation {
            reading,
            alerts,
            receipt,
        })
    }
}
