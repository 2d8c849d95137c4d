use serde::{Deserialize, Serialize};

use crate::wire::{centi_to_celsius, SensorLocation};
use crate::{Address, AlertType, BatchStatus, Role};

/// Registered actor. Role is fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub address: Address,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    /// Epoch seconds.
    pub registered_at: i64,
}

/// A uniquely identified unit of drug product tracked through custody.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_id: String,
    pub drug_name: String,
    pub current_owner: Address,
    pub status: BatchStatus,
    /// Epoch seconds.
    pub created_at: i64,
    pub exists: bool,
}

impl Batch {
    pub fn is_owned_by(&self, who: &Address) -> bool {
        &self.current_owner == who
    }
}

/// One custody step. `status` is the status reached by the transition and
/// `to` is the owner after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Ledger-wide sequence id (0-based, append order).
    pub id: u64,
    pub batch_id: String,
    pub from: Address,
    pub to: Address,
    pub status: BatchStatus,
    pub timestamp: i64,
    pub location: String,
    pub remarks: String,
}

/// One sensor submission as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IotReading {
    pub id: u64,
    pub batch_id: String,
    pub timestamp: i64,
    /// Raw wire form, possibly carrying a `|GPS:` suffix.
    pub location: String,
    /// Degrees Celsius × 100, rounded half-up.
    pub temperature_centi: i32,
    /// Relative humidity, percent.
    pub humidity: u32,
    /// kPa.
    pub pressure: u32,
    pub tamper_detected: bool,
    pub recorded_by: Address,
}

impl IotReading {
    pub fn temperature_celsius(&self) -> f64 {
        centi_to_celsius(self.temperature_centi)
    }

    pub fn sensor_location(&self) -> SensorLocation {
        SensorLocation::parse(&self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: u64,
    pub batch_id: String,
    pub alert_type: AlertType,
    pub timestamp: i64,
    pub message: String,
    pub resolved: bool,
    pub raised_by: Address,
    pub resolved_by: Option<Address>,
    pub resolved_at: Option<i64>,
}

/// Outcome of an FDA review. The latest decision per batch wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FdaDecision {
    pub batch_id: String,
    pub approved: bool,
    pub timestamp: i64,
    pub remarks: String,
    pub decided_by: Address,
}
