//! `psc demo`: register one actor per role and walk a fresh batch from
//! supplier to pharmacy, logging one in-band and one out-of-band reading.

use anyhow::Result;
use psc_schemas::wire::SensorLocation;
use psc_schemas::Role;
use psc_telemetry::SensorInput;
use tracing::info;

use super::{status_label, str_field, CliContext};
use crate::client::ApiFailure;

const SUPPLIER: &str = "0x00000000000000000000000000000000000000a1";
const MANUFACTURER: &str = "0x00000000000000000000000000000000000000b1";
const FDA: &str = "0x00000000000000000000000000000000000000f1";
const REPACKAGER: &str = "0x00000000000000000000000000000000000000c1";
const DISTRIBUTOR: &str = "0x00000000000000000000000000000000000000d1";
const PHARMACY: &str = "0x00000000000000000000000000000000000000e1";

const ACTORS: [(&str, &str, Role); 6] = [
    (SUPPLIER, "Demo Ingredient Supplier", Role::IngredientSupplier),
    (MANUFACTURER, "Demo Manufacturer", Role::Manufacturer),
    (FDA, "Demo FDA Reviewer", Role::Fda),
    (REPACKAGER, "Demo Repackager", Role::Repackager),
    (DISTRIBUTOR, "Demo Distributor", Role::Distributor),
    (PHARMACY, "Demo Pharmacy", Role::Pharmacy),
];

pub async fn run(ctx: &CliContext, batch_id: Option<String>) -> Result<()> {
    let api = &ctx.client;
    let batch_id =
        batch_id.unwrap_or_else(|| format!("DEMO-{}", chrono::Utc::now().timestamp()));
    println!("api={}", api.base());
    println!("batch_id={}", batch_id);

    for (address, name, role) in ACTORS {
        match api.register_user(address, name, role.code()).await {
            Ok(_) => println!("registered={} role={}", address, role.label()),
            Err(e) => match e.downcast_ref::<ApiFailure>() {
                Some(f) if f.is_kind("already_exists") => {
                    println!("registered={} role={} existing=true", address, role.label())
                }
                _ => return Err(e),
            },
        }
    }

    let created = api.create_batch(SUPPLIER, &batch_id, "Amoxicillin 500mg").await?;
    step("create", &created);

    step(
        "transfer_to_manufacturer",
        &api.transfer("manufacturer", SUPPLIER, &batch_id, MANUFACTURER, Some("Supplier Warehouse"))
            .await?,
    );
    step(
        "request_fda_approval",
        &api.batch_action("/api/fda/request", MANUFACTURER, &batch_id).await?,
    );
    step(
        "approve_drug",
        &api.approve(FDA, &batch_id, "Meets quality standards").await?,
    );
    step(
        "manufacture_drug",
        &api.batch_action("/api/drugs/manufacture", MANUFACTURER, &batch_id).await?,
    );

    log_reading(ctx, &batch_id, "Highway Route 2", 6.2).await?;
    // Out of the transport band: raises a temperature alert.
    log_reading(ctx, &batch_id, "Highway Route 2", 31.5).await?;

    step(
        "transfer_to_repackager",
        &api.transfer("repackager", MANUFACTURER, &batch_id, REPACKAGER, Some("Manufacturing Plant"))
            .await?,
    );
    step(
        "transfer_to_distributor",
        &api.transfer("distributor", REPACKAGER, &batch_id, DISTRIBUTOR, Some("Repackaging Facility"))
            .await?,
    );
    step(
        "transfer_to_pharmacy",
        &api.transfer("pharmacy", DISTRIBUTOR, &batch_id, PHARMACY, Some("Distribution Center"))
            .await?,
    );

    let history = api.get(&format!("/api/history/{batch_id}")).await?;
    let records = history["history"].as_array().cloned().unwrap_or_default();
    println!("history_records={}", records.len());
    for r in &records {
        println!(
            "record id={} status={} from={} to={} location={}",
            r["id"],
            status_label(&r["status"]),
            str_field(r, "from"),
            str_field(r, "to"),
            str_field(r, "location"),
        );
    }

    let readings = api.get(&format!("/api/iot/{batch_id}")).await?;
    let readings = readings["iotData"].as_array().cloned().unwrap_or_default();
    println!("readings={}", readings.len());
    for r in &readings {
        println!(
            "reading id={} location={} temperature={} humidity={} pressure={}",
            r["id"],
            str_field(r, "location"),
            r["temperature"],
            r["humidity"],
            r["pressure"]
        );
    }

    let alerts = api.get(&format!("/api/alerts/{batch_id}")).await?;
    let alerts = alerts["alerts"].as_array().cloned().unwrap_or_default();
    println!("alerts={}", alerts.len());
    for a in &alerts {
        println!(
            "alert id={} type={} message={}",
            a["id"],
            str_field(a, "alertTypeLabel"),
            str_field(a, "message")
        );
    }

    info!(batch_id = %batch_id, "demo complete");
    Ok(())
}

fn step(name: &str, body: &serde_json::Value) {
    let status = body["batch"]["statusLabel"].as_str().unwrap_or("-");
    println!(
        "step={} status={} tx_hash={}",
        name,
        status,
        str_field(body, "txHash")
    );
}

async fn log_reading(ctx: &CliContext, batch_id: &str, site: &str, temperature: f64) -> Result<()> {
    let input = SensorInput {
        batch_id: batch_id.to_string(),
        location: SensorLocation::named(site),
        temperature,
        humidity: 48.0,
        pressure: 101.0,
        tamper_detected: false,
    };
    let body = ctx.client.log_reading(&input).await?;
    let raised = body["alerts"].as_array().map_or(0, Vec::len);
    println!(
        "reading batch_id={} temperature={} alerts_raised={}",
        batch_id, temperature, raised
    );
    Ok(())
}
