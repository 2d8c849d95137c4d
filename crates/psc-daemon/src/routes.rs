//! Axum router and all HTTP handlers for psc-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers, so tests can drive the bare router.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use psc_custody::{Committed, TransitionRequest};
use psc_lifecycle::Transition;
use psc_schemas::wire::SensorLocation;
use psc_schemas::{Address, CoreError};
use psc_telemetry::{AmbientReading, SensorInput};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::{
    api_types::*,
    error::{ApiError, ApiResult},
    state::{AppState, BusMsg, LiveSnapshot},
};

const DEFAULT_TX_LIMIT: usize = 100;
const MAX_TX_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/stream", get(stream))
        // users
        .route("/api/users", get(list_users))
        .route("/api/users/register", post(register_user))
        .route("/api/users/:address", get(get_user))
        // batches
        .route("/api/drugs/create", post(create_batch))
        .route("/api/drugs/:batch_id", get(get_batch))
        .route("/api/drugs/transfer/manufacturer", post(transfer_to_manufacturer))
        .route("/api/drugs/transfer/repackager", post(transfer_to_repackager))
        .route("/api/drugs/transfer/distributor", post(transfer_to_distributor))
        .route("/api/drugs/transfer/pharmacy", post(transfer_to_pharmacy))
        .route("/api/drugs/manufacture", post(manufacture))
        .route("/api/history/:batch_id", get(history))
        .route("/api/transactions", get(transactions))
        // FDA
        .route("/api/fda/request", post(fda_request))
        .route("/api/fda/approve", post(fda_approve))
        .route("/api/fda/reject", post(fda_reject))
        .route("/api/fda/approval/:batch_id", get(fda_approval))
        // IoT
        .route("/api/iot/log", post(iot_log))
        .route("/api/iot/:batch_id", get(iot_for_batch))
        .route(
            "/api/live-temperature",
            get(live_temperature_get).post(live_temperature_post),
        )
        // alerts; one param name per segment, so `:id` is a batch id on GET
        // and an alert id under /resolve
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/report", post(report_fake_transfer))
        .route("/api/alerts/:id", get(alerts_for_batch))
        .route("/api/alerts/:id/resolve", post(resolve_alert))
        // derived views
        .route("/api/actions/:address", get(actions))
        .route("/api/notifications/:address", get(notifications))
        .route("/api/analytics/overview", get(analytics))
        .with_state(state)
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Ok(Address::parse(raw)?)
}

/// Run `f` on the blocking pool. Ledger calls lock a mutex and may fsync the
/// journal; neither belongs on an async worker.
async fn ledger_call<T, F>(st: &Arc<AppState>, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppState) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let st = Arc::clone(st);
    tokio::task::spawn_blocking(move || f(&st))
        .await
        .map_err(|e| ApiError(CoreError::ledger_unavailable(format!("ledger task failed: {e}"))))?
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "OK",
        service: st.build.service,
        version: st.build.version,
        config_hash: st.config_hash.clone(),
        credential_mode: st.credentials.mode(),
    })
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub(crate) async fn register_user(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RegisterUserRequest>,
) -> ApiResult<Json<RegisterUserResponse>> {
    let address = parse_address(&body.address)?;
    let role = body.role.to_role()?;
    let (user, receipt) = ledger_call(&st, move |st| {
        Ok(st.custody.register_user(address, &body.name, role)?)
    })
    .await?;
    info!(address = %user.address, role = role.label(), seq = receipt.seq, "user registered");
    Ok(Json(RegisterUserResponse {
        success: true,
        message: "User registered successfully".to_string(),
        user: user.into(),
        tx_hash: receipt.tx_hash,
        seq: receipt.seq,
    }))
}

pub(crate) async fn get_user(
    State(st): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let address = parse_address(&address)?;
    let user = ledger_call(&st, move |st| Ok(st.custody.user(&address)?)).await?;
    Ok(Json(UserResponse {
        success: true,
        user: user.into(),
    }))
}

pub(crate) async fn list_users(State(st): State<Arc<AppState>>) -> ApiResult<Json<UsersResponse>> {
    let users = ledger_call(&st, |st| {
        Ok(st.custody.ledger().list_users().map_err(CoreError::from)?)
    })
    .await?;
    Ok(Json(UsersResponse {
        success: true,
        users: users.into_iter().map(UserView::from).collect(),
    }))
}

// ---------------------------------------------------------------------------
// Batches and custody transitions
// ---------------------------------------------------------------------------

pub(crate) async fn create_batch(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CreateBatchRequest>,
) -> ApiResult<Json<TxResponse>> {
    let actor = st.credentials.resolve(&body.actor_credential)?;
    let creator = actor.clone();
    let (batch, receipt) = ledger_call(&st, move |st| {
        Ok(st
            .custody
            .create_batch(&creator, &body.batch_id, &body.drug_name)?)
    })
    .await?;
    info!(batch_id = %batch.batch_id, actor = %actor, seq = receipt.seq, "batch created");
    st.publish(BusMsg::Transition {
        batch_id: batch.batch_id.clone(),
        transition: Transition::CreateBatch.name().to_string(),
        status: batch.status.code(),
        owner: batch.current_owner.to_string(),
        seq: receipt.seq,
    });
    Ok(Json(TxResponse::created(
        "Drug batch created successfully",
        batch,
        receipt,
    )))
}

pub(crate) async fn get_batch(
    State(st): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<BatchResponse>> {
    let batch_id = require_id("batchId", &batch_id)?;
    let batch = ledger_call(&st, move |st| Ok(st.custody.batch(&batch_id)?)).await?;
    Ok(Json(BatchResponse {
        success: true,
        drug: batch.into(),
    }))
}

/// Commit `req`, log it and put it on the bus.
fn commit(st: &AppState, req: TransitionRequest, message: &str) -> ApiResult<Json<TxResponse>> {
    let transition = req.transition;
    let c: Committed = st.custody.execute(req)?;
    info!(
        batch_id = %c.batch.batch_id,
        transition = %transition,
        status = c.record.status.label(),
        owner = %c.batch.current_owner,
        seq = c.receipt.seq,
        "transition committed"
    );
    st.publish(BusMsg::Transition {
        batch_id: c.batch.batch_id.clone(),
        transition: transition.name().to_string(),
        status: c.record.status.code(),
        owner: c.batch.current_owner.to_string(),
        seq: c.receipt.seq,
    });
    Ok(Json(TxResponse::committed(message, c)))
}

/// A recipient that fails to parse is passed on as missing so the refusal
/// comes from the same validation step as any other bad recipient.
fn transfer(
    st: &AppState,
    transition: Transition,
    body: TransferRequest,
    message: &str,
) -> ApiResult<Json<TxResponse>> {
    let actor = st.credentials.resolve(&body.actor_credential)?;
    let mut req = TransitionRequest::new(transition, body.batch_id, actor);
    if let Ok(recipient) = Address::parse(&body.recipient_address) {
        req = req.to(recipient);
    }
    if let Some(loc) = body.location.filter(|l| !l.trim().is_empty()) {
        req = req.at(loc);
    }
    commit(st, req, message)
}

pub(crate) async fn transfer_to_manufacturer(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<TransferRequest>,
) -> ApiResult<Json<TxResponse>> {
    ledger_call(&st, move |st| {
        transfer(st, Transition::TransferToManufacturer, body, "Transferred to manufacturer successfully")
    })
    .await
}

pub(crate) async fn transfer_to_repackager(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<TransferRequest>,
) -> ApiResult<Json<TxResponse>> {
    ledger_call(&st, move |st| {
        transfer(st, Transition::TransferToRepackager, body, "Transferred to repackager successfully")
    })
    .await
}

pub(crate) async fn transfer_to_distributor(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<TransferRequest>,
) -> ApiResult<Json<TxResponse>> {
    ledger_call(&st, move |st| {
        transfer(st, Transition::TransferToDistributor, body, "Transferred to distributor successfully")
    })
    .await
}

pub(crate) async fn transfer_to_pharmacy(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<TransferRequest>,
) -> ApiResult<Json<TxResponse>> {
    ledger_call(&st, move |st| {
        transfer(st, Transition::TransferToPharmacy, body, "Transferred to pharmacy and dispensed")
    })
    .await
}

pub(crate) async fn manufacture(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<BatchActionRequest>,
) -> ApiResult<Json<TxResponse>> {
    let actor = st.credentials.resolve(&body.actor_credential)?;
    let req = TransitionRequest::new(Transition::ManufactureDrug, body.batch_id, actor);
    ledger_call(&st, move |st| commit(st, req, "Drug manufactured successfully")).await
}

pub(crate) async fn history(
    State(st): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<HistoryResponse>> {
    let batch_id = require_id("batchId", &batch_id)?;
    let history = ledger_call(&st, move |st| Ok(st.custody.history(&batch_id)?)).await?;
    Ok(Json(HistoryResponse {
        success: true,
        history,
    }))
}

/// Most recent first.
pub(crate) async fn transactions(
    State(st): State<Arc<AppState>>,
    q: Result<Query<TransactionsQuery>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<TransactionsResponse>> {
    let Query(q) = q?;
    let limit = q.limit.unwrap_or(DEFAULT_TX_LIMIT).min(MAX_TX_LIMIT);
    let transactions = ledger_call(&st, move |st| {
        Ok(st
            .custody
            .ledger()
            .list_all_transactions(limit)
            .map_err(CoreError::from)?)
    })
    .await?;
    Ok(Json(TransactionsResponse {
        success: true,
        transactions,
    }))
}

// ---------------------------------------------------------------------------
// FDA
// ---------------------------------------------------------------------------

pub(crate) async fn fda_request(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<BatchActionRequest>,
) -> ApiResult<Json<TxResponse>> {
    let actor = st.credentials.resolve(&body.actor_credential)?;
    let req = TransitionRequest::new(Transition::RequestFdaApproval, body.batch_id, actor);
    ledger_call(&st, move |st| commit(st, req, "FDA approval requested successfully")).await
}

pub(crate) async fn fda_approve(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<ApproveRequest>,
) -> ApiResult<Json<TxResponse>> {
    let actor = st.credentials.resolve(&body.actor_credential)?;
    let req =
        TransitionRequest::new(Transition::ApproveDrug, body.batch_id, actor).remarks(body.remarks);
    ledger_call(&st, move |st| commit(st, req, "Drug approved by FDA")).await
}

pub(crate) async fn fda_reject(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RejectRequest>,
) -> ApiResult<Json<TxResponse>> {
    let actor = st.credentials.resolve(&body.actor_credential)?;
    let reviewer = actor.clone();
    let c = ledger_call(&st, move |st| {
        Ok(st
            .custody
            .reject_drug(&reviewer, &body.batch_id, &body.reason)?)
    })
    .await?;
    info!(batch_id = %c.batch.batch_id, actor = %actor, seq = c.receipt.seq, "drug rejected");
    st.publish(BusMsg::Transition {
        batch_id: c.batch.batch_id.clone(),
        transition: Transition::RejectDrug.name().to_string(),
        status: c.record.status.code(),
        owner: c.batch.current_owner.to_string(),
        seq: c.receipt.seq,
    });
    Ok(Json(TxResponse::committed("Drug rejected by FDA", c)))
}

pub(crate) async fn fda_approval(
    State(st): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<ApprovalResponse>> {
    let batch_id = require_id("batchId", &batch_id)?;
    let decision = ledger_call(&st, move |st| Ok(st.custody.fda_decision(&batch_id)?)).await?;
    Ok(Json(ApprovalResponse {
        success: true,
        approval: decision.map(ApprovalView::from),
    }))
}

// ---------------------------------------------------------------------------
// IoT
// ---------------------------------------------------------------------------

/// Transport-policy evaluation of one sensor reading.
pub(crate) async fn iot_log(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<IotLogRequest>,
) -> ApiResult<Json<IotLogResponse>> {
    let recorded_by = match body
        .actor_credential
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    {
        Some(c) => st.credentials.resolve(c)?,
        None => Address::system(),
    };
    let location = match (body.latitude, body.longitude) {
        (Some(lat), Some(lng)) => SensorLocation::with_gps(body.location.clone(), lat, lng),
        _ => SensorLocation::parse(&body.location),
    };
    let input = SensorInput {
        batch_id: body.batch_id,
        location,
        temperature: body.temperature,
        humidity: body.humidity,
        pressure: body.pressure,
        tamper_detected: body.tamper_detected,
    };

    let ev = ledger_call(&st, move |st| {
        Ok(st
            .telemetry
            .submit(&input, &st.policies.transport, &recorded_by)?)
    })
    .await?;

    st.publish(BusMsg::Reading {
        batch_id: ev.reading.batch_id.clone(),
        reading_id: ev.reading.id,
        temperature: ev.reading.temperature_celsius(),
        alerts_raised: ev.alerts.len(),
    });
    for a in &ev.alerts {
        st.publish(BusMsg::Alert {
            alert_id: a.id,
            batch_id: a.batch_id.clone(),
            alert_type: a.alert_type.code(),
            message: a.message.clone(),
        });
    }

    Ok(Json(IotLogResponse {
        success: true,
        message: "IoT data logged successfully".to_string(),
        tx_hash: ev.receipt.tx_hash,
        seq: ev.receipt.seq,
        reading: ev.reading.into(),
        alerts: ev.alerts.into_iter().map(AlertView::from).collect(),
    }))
}

pub(crate) async fn iot_for_batch(
    State(st): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<IotDataResponse>> {
    let batch_id = require_id("batchId", &batch_id)?;
    let readings = ledger_call(&st, move |st| {
        let batch = st.custody.batch(&batch_id)?;
        Ok(st
            .custody
            .ledger()
            .list_readings_for_batch(&batch.batch_id)
            .map_err(CoreError::from)?)
    })
    .await?;
    Ok(Json(IotDataResponse {
        success: true,
        iot_data: readings.into_iter().map(ReadingView::from).collect(),
    }))
}

/// Bench sensor: live-lab evaluation applied to every batch not yet dispensed.
pub(crate) async fn live_temperature_post(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<AmbientReading>,
) -> ApiResult<Json<LiveTemperatureResponse>> {
    let reading = body.clone();
    let report = ledger_call(&st, move |st| {
        Ok(st.telemetry.fan_out(
            &reading,
            &st.ambient,
            &st.policies.live_lab,
            &Address::system(),
        )?)
    })
    .await?;

    let (location, humidity, pressure) = body.resolve(&st.ambient);
    let snapshot = LiveSnapshot {
        temperature: body.temperature,
        timestamp: chrono::Utc::now().timestamp_millis(),
        location,
        humidity,
        pressure,
    };
    *st.live.write().await = Some(snapshot.clone());

    for o in &report.evaluated {
        st.publish(BusMsg::Reading {
            batch_id: o.batch_id.clone(),
            reading_id: o.reading_id,
            temperature: body.temperature,
            alerts_raised: o.alerts_raised,
        });
    }

    Ok(Json(LiveTemperatureResponse {
        success: true,
        message: Some("Temperature data received".to_string()),
        data: Some(snapshot),
        fan_out: Some(report),
    }))
}

pub(crate) async fn live_temperature_get(
    State(st): State<Arc<AppState>>,
) -> Json<LiveTemperatureResponse> {
    let data = st.live.read().await.clone();
    let message = data
        .is_none()
        .then(|| "No temperature data available yet".to_string());
    Json(LiveTemperatureResponse {
        success: true,
        message,
        data,
        fan_out: None,
    })
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

pub(crate) async fn list_alerts(State(st): State<Arc<AppState>>) -> ApiResult<Json<AlertsResponse>> {
    let alerts = ledger_call(&st, |st| {
        Ok(st.custody.ledger().list_alerts().map_err(CoreError::from)?)
    })
    .await?;
    Ok(Json(AlertsResponse {
        success: true,
        alerts: alerts.into_iter().map(AlertView::from).collect(),
    }))
}

pub(crate) async fn alerts_for_batch(
    State(st): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<AlertsResponse>> {
    let batch_id = require_id("batchId", &batch_id)?;
    let alerts = ledger_call(&st, move |st| {
        let batch = st.custody.batch(&batch_id)?;
        Ok(st
            .custody
            .ledger()
            .list_alerts_for_batch(&batch.batch_id)
            .map_err(CoreError::from)?)
    })
    .await?;
    Ok(Json(AlertsResponse {
        success: true,
        alerts: alerts.into_iter().map(AlertView::from).collect(),
    }))
}

pub(crate) async fn resolve_alert(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ResolveAlertRequest>,
) -> ApiResult<Json<ResolveAlertResponse>> {
    let alert_id: u64 = id
        .trim()
        .parse()
        .map_err(|_| CoreError::validation(format!("alert id '{id}' is not a number")))?;
    let actor = st.credentials.resolve(&body.actor_credential)?;
    let resolver = actor.clone();
    let res = ledger_call(&st, move |st| Ok(st.custody.resolve_alert(&resolver, alert_id)?)).await?;

    let (message, already_resolved, tx_hash) = match res.receipt {
        Some(r) => {
            info!(alert_id, resolved_by = %actor, seq = r.seq, "alert resolved");
            st.publish(BusMsg::AlertResolved {
                alert_id,
                resolved_by: actor.to_string(),
            });
            ("Alert resolved successfully", false, Some(r.tx_hash))
        }
        None => ("Alert was already resolved", true, None),
    };

    Ok(Json(ResolveAlertResponse {
        success: true,
        message: message.to_string(),
        already_resolved,
        tx_hash,
        alert: res.alert.into(),
    }))
}

pub(crate) async fn report_fake_transfer(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<ReportFakeTransferRequest>,
) -> ApiResult<Json<ReportFakeTransferResponse>> {
    let actor = st.credentials.resolve(&body.actor_credential)?;
    let reporter = actor.clone();
    let (alert, receipt) = ledger_call(&st, move |st| {
        Ok(st
            .custody
            .report_fake_transfer(&reporter, &body.batch_id, &body.message)?)
    })
    .await?;
    info!(alert_id = alert.id, batch_id = %alert.batch_id, reporter = %actor, "fake transfer reported");
    st.publish(BusMsg::Alert {
        alert_id: alert.id,
        batch_id: alert.batch_id.clone(),
        alert_type: alert.alert_type.code(),
        message: alert.message.clone(),
    });
    Ok(Json(ReportFakeTransferResponse {
        success: true,
        message: "Fake transfer reported".to_string(),
        tx_hash: receipt.tx_hash,
        alert: alert.into(),
    }))
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

pub(crate) async fn actions(
    State(st): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<Json<ActionsResponse>> {
    let address = parse_address(&address)?;
    let actions = ledger_call(&st, move |st| Ok(st.custody.pending_actions(&address)?)).await?;
    Ok(Json(ActionsResponse {
        success: true,
        actions,
    }))
}

pub(crate) async fn notifications(
    State(st): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<Json<NotificationsResponse>> {
    let address = parse_address(&address)?;
    let notifications =
        ledger_call(&st, move |st| Ok(st.custody.notifications(&address)?)).await?;
    Ok(Json(NotificationsResponse {
        success: true,
        notifications,
    }))
}

pub(crate) async fn analytics(State(st): State<Arc<AppState>>) -> ApiResult<Json<AnalyticsResponse>> {
    let counts = ledger_call(&st, |st| {
        Ok(st.custody.ledger().counts().map_err(CoreError::from)?)
    })
    .await?;
    Ok(Json(AnalyticsResponse {
        success: true,
        analytics: counts.into(),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let events = broadcast_to_sse(st.bus.subscribe());
    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        // lagged receivers drop the missed events
        let m = msg.ok()?;
        let data = serde_json::to_string(&m).ok()?;
        Some(Ok(Event::default().event(m.event_name()).data(data)))
    })
}
