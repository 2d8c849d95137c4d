//! In-process scenario tests for psc-daemon HTTP endpoints.
//!
//! The Axum router is built without binding a socket and driven with
//! `tower::ServiceExt::oneshot`.
//!
//! GREEN when:
//! - The full custody chain over HTTP yields 7 history records ending in
//!   Dispensed, owned by the pharmacy.
//! - Refusals map to 404 / 403 / 409 / 400 with `{ success: false, kind }`
//!   and leave the ledger unchanged.
//! - Alert resolution over HTTP is idempotent.
//! - Transactions come back newest first and respect `limit`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use psc_daemon::{routes, state};
use psc_ledger::MemoryLedger;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

const SUPPLIER: &str = "0x00000000000000000000000000000000000000a1";
const MANUFACTURER: &str = "0x00000000000000000000000000000000000000b1";
const FDA: &str = "0x00000000000000000000000000000000000000f1";
const REPACKAGER: &str = "0x00000000000000000000000000000000000000c1";
const DISTRIBUTOR: &str = "0x00000000000000000000000000000000000000d1";
const PHARMACY: &str = "0x00000000000000000000000000000000000000e1";
const PATIENT: &str = "0x0000000000000000000000000000000000000001";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_state() -> Arc<state::AppState> {
    Arc::new(state::AppState::new(Arc::new(MemoryLedger::new())))
}

async fn call(st: &Arc<state::AppState>, req: Request<Body>) -> (StatusCode, Value) {
    let resp = routes::build_router(Arc::clone(st))
        .oneshot(req)
        .await
        .expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("body is not valid JSON")
    };
    (status, json)
}

async fn get(st: &Arc<state::AppState>, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    call(st, req).await
}

async fn post(st: &Arc<state::AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    call(st, req).await
}

async fn ok(st: &Arc<state::AppState>, uri: &str, body: Value) -> Value {
    let (status, json) = post(st, uri, body).await;
    assert_eq!(status, StatusCode::OK, "{uri}: {json}");
    assert_eq!(json["success"], true);
    json
}

async fn register_all(st: &Arc<state::AppState>) {
    for (address, name, role) in [
        (SUPPLIER, "Acme Ingredients", json!(2)),
        (MANUFACTURER, "PharmaCorp", json!("Manufacturer")),
        (FDA, "FDA Reviewer", json!(1)),
        (REPACKAGER, "PackRight", json!(4)),
        (DISTRIBUTOR, "MedDistrib", json!("distributor")),
        (PHARMACY, "Corner Pharmacy", json!(6)),
        (PATIENT, "Pat", json!(0)),
    ] {
        ok(
            st,
            "/api/users/register",
            json!({ "address": address, "name": name, "role": role }),
        )
        .await;
    }
}

async fn create(st: &Arc<state::AppState>, batch_id: &str) {
    ok(
        st,
        "/api/drugs/create",
        json!({ "batchId": batch_id, "drugName": "Amoxicillin", "actorCredential": SUPPLIER }),
    )
    .await;
}

async fn to_manufacturer(st: &Arc<state::AppState>, batch_id: &str) {
    ok(
        st,
        "/api/drugs/transfer/manufacturer",
        json!({ "batchId": batch_id, "recipientAddress": MANUFACTURER, "location": "Supplier Dock", "actorCredential": SUPPLIER }),
    )
    .await;
}

fn assert_refused(status: StatusCode, json: &Value, want: StatusCode, kind: &str) {
    assert_eq!(status, want, "{json}");
    assert_eq!(json["success"], false);
    assert_eq!(json["kind"], kind, "{json}");
    assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_service_and_mode() {
    let st = make_state();
    let (status, json) = get(&st, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "OK");
    assert_eq!(json["service"], "psc-daemon");
    assert_eq!(json["credentialMode"], "address");
}

// ---------------------------------------------------------------------------
// Full chain
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_chain_over_http() {
    let st = make_state();
    register_all(&st).await;
    create(&st, "B1").await;
    to_manufacturer(&st, "B1").await;

    ok(&st, "/api/fda/request", json!({ "batchId": "B1", "actorCredential": MANUFACTURER })).await;
    let approved = ok(
        &st,
        "/api/fda/approve",
        json!({ "batchId": "B1", "remarks": "meets standards", "actorCredential": FDA }),
    )
    .await;
    assert_eq!(approved["batch"]["statusLabel"], "FDA Approved");

    ok(&st, "/api/drugs/manufacture", json!({ "batchId": "B1", "actorCredential": MANUFACTURER })).await;
    ok(
        &st,
        "/api/drugs/transfer/repackager",
        json!({ "batchId": "B1", "recipientAddress": REPACKAGER, "actorCredential": MANUFACTURER }),
    )
    .await;
    ok(
        &st,
        "/api/drugs/transfer/distributor",
        json!({ "batchId": "B1", "recipientAddress": DISTRIBUTOR, "actorCredential": REPACKAGER }),
    )
    .await;
    let last = ok(
        &st,
        "/api/drugs/transfer/pharmacy",
        json!({ "batchId": "B1", "recipientAddress": PHARMACY, "actorCredential": DISTRIBUTOR }),
    )
    .await;
    assert_eq!(last["record"]["status"], 8);
    assert_eq!(last["record"]["to"], PHARMACY);
    assert_eq!(last["txHash"].as_str().unwrap().len(), 64);

    let (_, drug) = get(&st, "/api/drugs/B1").await;
    assert_eq!(drug["drug"]["status"], 8);
    assert_eq!(drug["drug"]["currentOwner"], PHARMACY);

    let (_, hist) = get(&st, "/api/history/B1").await;
    let statuses: Vec<u64> = hist["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["status"].as_u64().unwrap())
        .collect();
    assert_eq!(statuses, vec![1, 2, 3, 5, 6, 7, 8]);
    assert_eq!(hist["history"][0]["location"], "Supplier Dock");

    let (_, approval) = get(&st, "/api/fda/approval/B1").await;
    assert_eq!(approval["approval"]["approved"], true);
    assert_eq!(approval["approval"]["approvedBy"], FDA);
    assert_eq!(approval["approval"]["remarks"], "meets standards");

    let (_, analytics) = get(&st, "/api/analytics/overview").await;
    assert_eq!(analytics["analytics"]["totalTransactions"], 7);
    assert_eq!(analytics["analytics"]["totalBatches"], 1);
    assert_eq!(analytics["analytics"]["batchesByStatus"]["Dispensed"], 1);
}

#[tokio::test]
async fn rejection_is_terminal_over_http() {
    let st = make_state();
    register_all(&st).await;
    create(&st, "B2").await;
    to_manufacturer(&st, "B2").await;
    ok(&st, "/api/fda/request", json!({ "batchId": "B2", "actorCredential": MANUFACTURER })).await;

    let (status, json) = post(
        &st,
        "/api/fda/reject",
        json!({ "batchId": "B2", "reason": "  ", "actorCredential": FDA }),
    )
    .await;
    assert_refused(status, &json, StatusCode::BAD_REQUEST, "validation_error");

    ok(
        &st,
        "/api/fda/reject",
        json!({ "batchId": "B2", "reason": "contaminated", "actorCredential": FDA }),
    )
    .await;

    let (status, json) = post(
        &st,
        "/api/drugs/manufacture",
        json!({ "batchId": "B2", "actorCredential": MANUFACTURER }),
    )
    .await;
    assert_refused(status, &json, StatusCode::CONFLICT, "invalid_state");

    let (_, approval) = get(&st, "/api/fda/approval/B2").await;
    assert_eq!(approval["approval"]["approved"], false);
    assert_eq!(approval["approval"]["remarks"], "contaminated");
}

// ---------------------------------------------------------------------------
// Refusals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refusals_map_to_status_codes_without_mutation() {
    let st = make_state();
    register_all(&st).await;
    create(&st, "B1").await;

    let (_, before) = get(&st, "/api/analytics/overview").await;

    // unknown batch
    let (status, json) = post(
        &st,
        "/api/fda/request",
        json!({ "batchId": "NOPE", "actorCredential": MANUFACTURER }),
    )
    .await;
    assert_refused(status, &json, StatusCode::NOT_FOUND, "not_found");

    // wrong role
    let (status, json) = post(
        &st,
        "/api/drugs/create",
        json!({ "batchId": "B9", "drugName": "X", "actorCredential": PATIENT }),
    )
    .await;
    assert_refused(status, &json, StatusCode::FORBIDDEN, "unauthorized");

    // not the owner
    let (status, json) = post(
        &st,
        "/api/drugs/transfer/manufacturer",
        json!({ "batchId": "B1", "recipientAddress": MANUFACTURER, "actorCredential": DISTRIBUTOR }),
    )
    .await;
    assert_refused(status, &json, StatusCode::FORBIDDEN, "unauthorized");

    // missing credential
    let (status, json) = post(&st, "/api/fda/request", json!({ "batchId": "B1" })).await;
    assert_refused(status, &json, StatusCode::FORBIDDEN, "unauthorized");

    // wrong source status (FDA cannot approve before a request)
    let (status, json) = post(
        &st,
        "/api/fda/approve",
        json!({ "batchId": "B1", "actorCredential": FDA }),
    )
    .await;
    assert_refused(status, &json, StatusCode::CONFLICT, "invalid_state");

    // recipient with the wrong role
    let (status, json) = post(
        &st,
        "/api/drugs/transfer/manufacturer",
        json!({ "batchId": "B1", "recipientAddress": PHARMACY, "actorCredential": SUPPLIER }),
    )
    .await;
    assert_refused(status, &json, StatusCode::BAD_REQUEST, "validation_error");

    // empty recipient is a validation failure, not a parse crash
    let (status, json) = post(
        &st,
        "/api/drugs/transfer/manufacturer",
        json!({ "batchId": "B1", "recipientAddress": "", "actorCredential": SUPPLIER }),
    )
    .await;
    assert_refused(status, &json, StatusCode::BAD_REQUEST, "validation_error");

    // duplicate batch and duplicate user
    let (status, json) = post(
        &st,
        "/api/drugs/create",
        json!({ "batchId": "B1", "drugName": "Again", "actorCredential": SUPPLIER }),
    )
    .await;
    assert_refused(status, &json, StatusCode::CONFLICT, "already_exists");
    let (status, json) = post(
        &st,
        "/api/users/register",
        json!({ "address": SUPPLIER, "name": "Dup", "role": 2 }),
    )
    .await;
    assert_refused(status, &json, StatusCode::CONFLICT, "already_exists");

    // malformed body
    let req = Request::builder()
        .method("POST")
        .uri("/api/drugs/create")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, json) = call(&st, req).await;
    assert_refused(status, &json, StatusCode::BAD_REQUEST, "validation_error");

    // unknown role
    let (status, json) = post(
        &st,
        "/api/users/register",
        json!({ "address": "0x99", "name": "Who", "role": 9 }),
    )
    .await;
    assert_refused(status, &json, StatusCode::BAD_REQUEST, "validation_error");

    let (_, after) = get(&st, "/api/analytics/overview").await;
    assert_eq!(before["analytics"], after["analytics"]);

    let (_, drug) = get(&st, "/api/drugs/B1").await;
    assert_eq!(drug["drug"]["status"], 1);
    assert_eq!(drug["drug"]["currentOwner"], SUPPLIER);
}

#[tokio::test]
async fn unknown_lookups_are_404() {
    let st = make_state();
    let (status, json) = get(&st, "/api/drugs/GHOST").await;
    assert_refused(status, &json, StatusCode::NOT_FOUND, "not_found");
    let (status, json) = get(&st, "/api/history/GHOST").await;
    assert_refused(status, &json, StatusCode::NOT_FOUND, "not_found");
    let (status, json) = get(&st, &format!("/api/users/{PATIENT}")).await;
    assert_refused(status, &json, StatusCode::NOT_FOUND, "not_found");
    let (status, json) = post(
        &st,
        "/api/alerts/42/resolve",
        json!({ "actorCredential": FDA }),
    )
    .await;
    assert_refused(status, &json, StatusCode::NOT_FOUND, "not_found");
}

// ---------------------------------------------------------------------------
// IoT + alerts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn iot_log_alerts_and_resolution_is_idempotent() {
    let st = make_state();
    register_all(&st).await;
    create(&st, "B1").await;

    let logged = ok(
        &st,
        "/api/iot/log",
        json!({
            "batchId": "B1", "location": "Highway Route 1", "temperature": -12.0,
            "humidity": 50, "pressure": 101, "tamperDetected": false,
            "latitude": 40.0583, "longitude": -76.3055
        }),
    )
    .await;
    assert_eq!(logged["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(logged["alerts"][0]["alertType"], 0);
    assert_eq!(logged["reading"]["recordedBy"], "system");

    let (_, data) = get(&st, "/api/iot/B1").await;
    let r = &data["iotData"][0];
    assert_eq!(r["temperature"], -12.0);
    assert_eq!(r["location"], "Highway Route 1");
    assert_eq!(r["gps"]["latitude"], 40.0583);

    let ok_reading = ok(
        &st,
        "/api/iot/log",
        json!({ "batchId": "B1", "location": "Warehouse A", "temperature": 20.0, "humidity": 50, "pressure": 101 }),
    )
    .await;
    assert!(ok_reading["alerts"].as_array().unwrap().is_empty());

    let (_, alerts) = get(&st, "/api/alerts/B1").await;
    let id = alerts["alerts"][0]["id"].as_u64().unwrap();

    // patients may not resolve
    let (status, json) = post(
        &st,
        &format!("/api/alerts/{id}/resolve"),
        json!({ "actorCredential": PATIENT }),
    )
    .await;
    assert_refused(status, &json, StatusCode::FORBIDDEN, "unauthorized");

    let first = ok(&st, &format!("/api/alerts/{id}/resolve"), json!({ "actorCredential": FDA })).await;
    assert_eq!(first["alreadyResolved"], false);
    assert!(first["txHash"].is_string());

    let second = ok(
        &st,
        &format!("/api/alerts/{id}/resolve"),
        json!({ "actorCredential": DISTRIBUTOR }),
    )
    .await;
    assert_eq!(second["alreadyResolved"], true);
    assert!(second["txHash"].is_null());
    assert_eq!(second["alert"]["resolvedBy"], FDA);

    let (_, all) = get(&st, "/api/alerts").await;
    assert_eq!(all["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(all["alerts"][0]["resolved"], true);
}

#[tokio::test]
async fn fake_transfer_report_becomes_alert_and_notification() {
    let st = make_state();
    register_all(&st).await;
    create(&st, "B1").await;

    let rep = ok(
        &st,
        "/api/alerts/report",
        json!({ "batchId": "B1", "message": "seal broken at dock", "actorCredential": PHARMACY }),
    )
    .await;
    assert_eq!(rep["alert"]["alertType"], 4);
    assert_eq!(rep["alert"]["alertTypeLabel"], "Fake Transfer");
    assert!(rep["alert"]["message"]
        .as_str()
        .unwrap()
        .contains("seal broken at dock"));

    let (_, n) = get(&st, &format!("/api/notifications/{SUPPLIER}")).await;
    let cats: Vec<&str> = n["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|x| x["category"].as_str().unwrap())
        .collect();
    assert_eq!(cats, vec!["action", "alert"]);

    let (_, n) = get(&st, &format!("/api/notifications/{PATIENT}")).await;
    assert!(n["notifications"].as_array().unwrap().is_empty());

    let (_, a) = get(&st, &format!("/api/actions/{SUPPLIER}")).await;
    assert_eq!(a["actions"][0]["batchId"], "B1");
}

#[tokio::test]
async fn transactions_newest_first_with_limit() {
    let st = make_state();
    register_all(&st).await;
    for id in ["T1", "T2", "T3"] {
        create(&st, id).await;
        to_manufacturer(&st, id).await;
    }

    let (_, all) = get(&st, "/api/transactions").await;
    assert_eq!(all["transactions"].as_array().unwrap().len(), 3);

    let (status, two) = get(&st, "/api/transactions?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = two["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["batchId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["T3", "T2"]);

    let (status, json) = get(&st, "/api/transactions?limit=lots").await;
    assert_refused(status, &json, StatusCode::BAD_REQUEST, "validation_error");
}

// ---------------------------------------------------------------------------
// Event bus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn writes_are_published_on_the_bus() {
    let st = make_state();
    let mut rx = st.bus.subscribe();
    register_all(&st).await;
    create(&st, "B1").await;
    ok(
        &st,
        "/api/iot/log",
        json!({ "batchId": "B1", "location": "Lab", "temperature": 30.0, "humidity": 50, "pressure": 101 }),
    )
    .await;

    let mut names = Vec::new();
    while let Ok(m) = rx.try_recv() {
        names.push(m.event_name());
    }
    assert_eq!(names, vec!["transition", "reading", "alert"]);
}
