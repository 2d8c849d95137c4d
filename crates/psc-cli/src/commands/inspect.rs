//! `psc inspect`: read-only views, one `key=value` line per item.

use anyhow::Result;
use serde_json::Value;

use super::{status_label, str_field, CliContext};

fn items<'a>(body: &'a Value, key: &str) -> &'a [Value] {
    body[key].as_array().map(Vec::as_slice).unwrap_or(&[])
}

pub async fn alerts(ctx: &CliContext) -> Result<()> {
    let body = ctx.client.get("/api/alerts").await?;
    let alerts = items(&body, "alerts");
    println!("alerts={}", alerts.len());
    for a in alerts {
        println!(
            "alert id={} batch_id={} type={} resolved={} message={}",
            a["id"],
            str_field(a, "batchId"),
            str_field(a, "alertTypeLabel"),
            a["resolved"],
            str_field(a, "message")
        );
    }
    Ok(())
}

pub async fn batch(ctx: &CliContext, batch_id: &str) -> Result<()> {
    let body = ctx.client.get(&format!("/api/drugs/{batch_id}")).await?;
    let drug = &body["drug"];
    println!("batch_id={}", str_field(drug, "batchId"));
    println!("drug_name={}", str_field(drug, "drugName"));
    println!("status={}", str_field(drug, "statusLabel"));
    println!("current_owner={}", str_field(drug, "currentOwner"));

    let history = ctx.client.get(&format!("/api/history/{batch_id}")).await?;
    for r in items(&history, "history") {
        println!(
            "record id={} status={} from={} to={} location={} remarks={}",
            r["id"],
            status_label(&r["status"]),
            str_field(r, "from"),
            str_field(r, "to"),
            str_field(r, "location"),
            str_field(r, "remarks")
        );
    }

    let approval = ctx
        .client
        .get(&format!("/api/fda/approval/{batch_id}"))
        .await?;
    match approval["approval"].as_object() {
        Some(a) => println!(
            "fda_approved={} fda_remarks={}",
            a.get("approved").unwrap_or(&Value::Null),
            a.get("remarks").and_then(Value::as_str).unwrap_or("")
        ),
        None => println!("fda_decision=none"),
    }
    Ok(())
}

pub async fn users(ctx: &CliContext) -> Result<()> {
    let body = ctx.client.get("/api/users").await?;
    let users = items(&body, "users");
    println!("users={}", users.len());
    for u in users {
        println!(
            "user address={} role={} active={} name={}",
            str_field(u, "address"),
            str_field(u, "roleLabel"),
            u["isActive"],
            str_field(u, "name")
        );
    }
    Ok(())
}

pub async fn notifications(ctx: &CliContext, address: &str) -> Result<()> {
    let body = ctx
        .client
        .get(&format!("/api/notifications/{address}"))
        .await?;
    let list = items(&body, "notifications");
    println!("notifications={}", list.len());
    for n in list {
        match str_field(n, "category") {
            "action" => println!(
                "action batch_id={} title={}",
                str_field(n, "batchId"),
                str_field(n, "title")
            ),
            _ => println!(
                "alert id={} batch_id={} message={}",
                n["alertId"],
                str_field(n, "batchId"),
                str_field(n, "message")
            ),
        }
    }
    Ok(())
}

pub async fn transactions(ctx: &CliContext, limit: Option<usize>) -> Result<()> {
    let path = match limit {
        Some(n) => format!("/api/transactions?limit={n}"),
        None => "/api/transactions".to_string(),
    };
    let body = ctx.client.get(&path).await?;
    let txs = items(&body, "transactions");
    println!("transactions={}", txs.len());
    for r in txs {
        println!(
            "record id={} batch_id={} status={} from={} to={}",
            r["id"],
            str_field(r, "batchId"),
            status_label(&r["status"]),
            str_field(r, "from"),
            str_field(r, "to")
        );
    }
    Ok(())
}
