//! Journaled daemon under a multi-threaded runtime.
//!
//! GREEN when:
//! - Concurrent registrations over HTTP each get a distinct sequence number
//!   and every one lands in the journal.
//! - A daemon rebuilt from the same journal serves the same users and
//!   batches.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use psc_daemon::{routes, state};
use psc_ledger::{verify_journal, MemoryLedger, VerifyResult};
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

const SUPPLIER: &str = "0x00000000000000000000000000000000000000a1";

fn journaled_state(path: &std::path::Path) -> Arc<state::AppState> {
    let ledger = MemoryLedger::open_journaled(path).expect("open journal");
    Arc::new(state::AppState::new(Arc::new(ledger)))
}

async fn call(st: &Arc<state::AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(b) => {
            req = req.header("content-type", "application/json");
            Body::from(b.to_string())
        }
        None => Body::empty(),
    };
    let resp = routes::build_router(Arc::clone(st))
        .oneshot(req.body(body).unwrap())
        .await
        .expect("oneshot failed");
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).expect("body is not valid JSON"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_writes_are_journaled_and_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let st = journaled_state(&path);

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let st = Arc::clone(&st);
        tasks.push(tokio::spawn(async move {
            let address = format!("0x{:040x}", 0x100 + u32::from(i));
            call(
                &st,
                "POST",
                "/api/users/register",
                Some(json!({ "address": address, "name": format!("patient {i}"), "role": 0 })),
            )
            .await
        }));
    }
    let mut seqs = Vec::new();
    for t in tasks {
        let (status, json) = t.await.unwrap();
        assert_eq!(status, StatusCode::OK, "{json}");
        seqs.push(json["seq"].as_u64().unwrap());
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (0..8).collect::<Vec<u64>>());

    let (status, json) = call(
        &st,
        "POST",
        "/api/users/register",
        Some(json!({ "address": SUPPLIER, "name": "Acme", "role": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    let (status, json) = call(
        &st,
        "POST",
        "/api/drugs/create",
        Some(json!({ "batchId": "J1", "drugName": "Amoxicillin", "actorCredential": SUPPLIER })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    drop(st);

    assert_eq!(verify_journal(&path).unwrap(), VerifyResult::Valid { lines: 10 });

    let restarted = journaled_state(&path);
    let (_, users) = call(&restarted, "GET", "/api/users", None).await;
    assert_eq!(users["users"].as_array().unwrap().len(), 9);
    let (status, drug) = call(&restarted, "GET", "/api/drugs/J1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drug["drug"]["currentOwner"], SUPPLIER);
}
