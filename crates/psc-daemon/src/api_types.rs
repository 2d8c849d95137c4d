//! Request and response types for all psc-daemon HTTP endpoints.
//!
//! Bodies are camelCase JSON. Every response carries `success`; failures use
//! [`ErrorResponse`]. Temperatures are Celsius here and centi-degrees only
//! inside the ledger.

use std::collections::BTreeMap;

use axum::extract::FromRequest;
use psc_custody::Committed;
use psc_ledger::{LedgerCounts, Receipt};
use psc_lifecycle::{Notification, PendingAction};
use psc_schemas::wire::GeoPoint;
use psc_schemas::{
    Alert, Batch, BatchStatus, CoreError, CoreResult, ErrorKind, FdaDecision, IotReading, Role,
    TransactionRecord, User,
};
use psc_telemetry::FanOutReport;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::LiveSnapshot;

/// `Json<T>` whose rejection is a 400 in the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub kind: ErrorKind,
}

// ---------------------------------------------------------------------------
// /api/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub config_hash: Option<String>,
    pub credential_mode: &'static str,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A role given either as its integer code or by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RoleInput {
    Code(u8),
    Name(String),
}

impl RoleInput {
    pub fn to_role(&self) -> CoreResult<Role> {
        match self {
            RoleInput::Code(c) => Role::try_from(*c),
            RoleInput::Name(n) => n.parse(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    #[serde(alias = "userAddress")]
    pub address: String,
    pub name: String,
    pub role: RoleInput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(flatten)]
    pub user: User,
    pub role_label: &'static str,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        let role_label = user.role.label();
        Self { user, role_label }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserResponse {
    pub success: bool,
    pub message: String,
    pub user: UserView,
    pub tx_hash: String,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserView,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsersResponse {
    pub success: bool,
    pub users: Vec<UserView>,
}

// ---------------------------------------------------------------------------
// Batches and custody transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchRequest {
    pub batch_id: String,
    pub drug_name: String,
    #[serde(default)]
    pub actor_credential: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub batch_id: String,
    pub recipient_address: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub actor_credential: String,
}

/// manufacture, FDA request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchActionRequest {
    pub batch_id: String,
    #[serde(default)]
    pub actor_credential: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub batch_id: String,
    #[serde(default)]
    pub remarks: String,
    #[serde(default)]
    pub actor_credential: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub batch_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub actor_credential: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: Batch,
    pub status_label: &'static str,
}

impl From<Batch> for BatchView {
    fn from(batch: Batch) -> Self {
        let status_label = batch.status.label();
        Self {
            batch,
            status_label,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub drug: BatchView,
}

/// Any ledger write. `batch` and `record` are present for transitions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    pub success: bool,
    pub message: String,
    pub tx_hash: String,
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<TransactionRecord>,
}

impl TxResponse {
    pub fn committed(message: impl Into<String>, c: Committed) -> Self {
        Self {
            success: true,
            message: message.into(),
            tx_hash: c.receipt.tx_hash,
            seq: c.receipt.seq,
            batch: Some(c.batch.into()),
            record: Some(c.record),
        }
    }

    pub fn created(message: impl Into<String>, batch: Batch, receipt: Receipt) -> Self {
        Self {
            success: true,
            message: message.into(),
            tx_hash: receipt.tx_hash,
            seq: receipt.seq,
            batch: Some(batch.into()),
            record: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub history: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionsResponse {
    pub success: bool,
    pub transactions: Vec<TransactionRecord>,
}

// ---------------------------------------------------------------------------
// FDA
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    pub batch_id: String,
    pub approved: bool,
    pub timestamp: i64,
    pub remarks: String,
    pub approved_by: String,
}

impl From<FdaDecision> for ApprovalView {
    fn from(d: FdaDecision) -> Self {
        Self {
            batch_id: d.batch_id,
            approved: d.approved,
            timestamp: d.timestamp,
            remarks: d.remarks,
            approved_by: d.decided_by.into(),
        }
    }
}

/// `approval: null` until the FDA has decided.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalResponse {
    pub success: bool,
    pub approval: Option<ApprovalView>,
}

// ---------------------------------------------------------------------------
// IoT
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IotLogRequest {
    pub batch_id: String,
    #[serde(default)]
    pub location: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    #[serde(default)]
    pub tamper_detected: bool,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Omitted for unattended sensors; recorded as the system address.
    #[serde(default)]
    pub actor_credential: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingView {
    pub id: u64,
    pub batch_id: String,
    pub timestamp: i64,
    pub location: String,
    pub gps: Option<GeoPoint>,
    /// °C
    pub temperature: f64,
    pub humidity: u32,
    pub pressure: u32,
    pub tamper_detected: bool,
    pub recorded_by: String,
}

impl From<IotReading> for ReadingView {
    fn from(r: IotReading) -> Self {
        let loc = r.sensor_location();
        Self {
            id: r.id,
            temperature: r.temperature_celsius(),
            batch_id: r.batch_id,
            timestamp: r.timestamp,
            location: loc.name,
            gps: loc.gps,
            humidity: r.humidity,
            pressure: r.pressure,
            tamper_detected: r.tamper_detected,
            recorded_by: r.recorded_by.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IotLogResponse {
    pub success: bool,
    pub message: String,
    pub tx_hash: String,
    pub seq: u64,
    pub reading: ReadingView,
    pub alerts: Vec<AlertView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IotDataResponse {
    pub success: bool,
    pub iot_data: Vec<ReadingView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTemperatureResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: Option<LiveSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_out: Option<FanOutReport>,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: Alert,
    pub alert_type_label: &'static str,
}

impl From<Alert> for AlertView {
    fn from(alert: Alert) -> Self {
        let alert_type_label = alert.alert_type.label();
        Self {
            alert,
            alert_type_label,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsResponse {
    pub success: bool,
    pub alerts: Vec<AlertView>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAlertRequest {
    #[serde(default)]
    pub actor_credential: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAlertResponse {
    pub success: bool,
    pub message: String,
    pub already_resolved: bool,
    pub tx_hash: Option<String>,
    pub alert: AlertView,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFakeTransferRequest {
    pub batch_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub actor_credential: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFakeTransferResponse {
    pub success: bool,
    pub message: String,
    pub tx_hash: String,
    pub alert: AlertView,
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ActionsResponse {
    pub success: bool,
    pub actions: Vec<PendingAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationsResponse {
    pub success: bool,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_transactions: usize,
    #[serde(rename = "totalIoTLogs")]
    pub total_iot_logs: usize,
    pub total_alerts: usize,
    pub unresolved_alerts: usize,
    pub total_batches: usize,
    pub total_users: usize,
    /// Keyed by status label; statuses with no batches are omitted.
    pub batches_by_status: BTreeMap<String, usize>,
}

impl From<LedgerCounts> for Analytics {
    fn from(c: LedgerCounts) -> Self {
        let batches_by_status = c
            .batches_by_status
            .iter()
            .filter_map(|(code, n)| BatchStatus::from_code(*code).map(|s| (s.label().to_string(), *n)))
            .collect();
        Self {
            total_transactions: c.transactions,
            total_iot_logs: c.readings,
            total_alerts: c.alerts,
            unresolved_alerts: c.unresolved_alerts,
            total_batches: c.batches,
            total_users: c.users,
            batches_by_status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsResponse {
    pub success: bool,
    pub analytics: Analytics,
}

/// Reject empty path segments up front so handlers can assume non-empty ids.
pub fn require_id(what: &str, raw: &str) -> CoreResult<String> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(CoreError::validation(format!("{what} must not be empty")));
    }
    Ok(t.to_string())
}
