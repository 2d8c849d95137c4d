//! `psc simulate`: synthetic sensor traffic against a running daemon.
//!
//! Readings are generated locally and posted to `/api/iot/log`; threshold
//! evaluation happens in the daemon. A failed post is logged and the loop
//! keeps going.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use psc_telemetry::simulator::{SensorSimulator, DEFAULT_ROUTE, JOURNEY};
use psc_telemetry::{spawn_monitor, SensorInput};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use super::{warn_failed, CliContext};
use crate::client::ApiClient;

pub struct StartArgs {
    pub batch_id: String,
    pub route: Vec<String>,
    pub interval_secs: Option<u64>,
    pub count: Option<u64>,
}

#[derive(Default)]
struct Tally {
    posted: AtomicU64,
    failed: AtomicU64,
    alerts: AtomicU64,
}

impl Tally {
    fn print(&self, ticks: u64) {
        println!(
            "ticks={} posted={} failed={} alerts_raised={}",
            ticks,
            self.posted.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
            self.alerts.load(Ordering::SeqCst)
        );
    }
}

fn simulator(ctx: &CliContext) -> SensorSimulator<StdRng> {
    SensorSimulator::new(StdRng::from_entropy())
        .with_anomaly_chance(ctx.settings.simulator.anomaly_chance)
}

async fn post(client: &ApiClient, input: &SensorInput, tally: &Tally) {
    match client.log_reading(input).await {
        Ok(body) => {
            let raised = body["alerts"].as_array().map_or(0, Vec::len) as u64;
            tally.posted.fetch_add(1, Ordering::SeqCst);
            tally.alerts.fetch_add(raised, Ordering::SeqCst);
            if raised > 0 {
                warn!(
                    batch_id = %input.batch_id,
                    location = %input.location.name,
                    temperature = input.temperature,
                    alerts = raised,
                    "reading raised alerts"
                );
            }
            println!(
                "reading batch_id={} location={} temperature={:.1} humidity={:.0} pressure={:.0} tamper={} alerts_raised={}",
                input.batch_id,
                input.location.name,
                input.temperature,
                input.humidity,
                input.pressure,
                input.tamper_detected,
                raised
            );
        }
        Err(e) => {
            tally.failed.fetch_add(1, Ordering::SeqCst);
            warn_failed("iot log", &e);
        }
    }
}

pub async fn start(ctx: &CliContext, args: StartArgs) -> Result<()> {
    let route: Vec<String> = if args.route.is_empty() {
        ctx.route_or(&DEFAULT_ROUTE)
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        args.route
    };
    let interval = Duration::from_secs(
        args.interval_secs
            .unwrap_or(ctx.settings.simulator.interval_secs)
            .max(1),
    );
    info!(
        batch_id = %args.batch_id,
        stops = route.len(),
        interval_secs = interval.as_secs(),
        "simulation started"
    );

    let tally = Arc::new(Tally::default());
    let mut sim = simulator(ctx);
    let client = ctx.client.clone();
    let batch_id = args.batch_id;
    let t = Arc::clone(&tally);

    let handle = spawn_monitor("simulate", interval, args.count, move |_| {
        let stops: Vec<&str> = route.iter().map(String::as_str).collect();
        let input = sim.reading(&batch_id, &stops);
        let client = client.clone();
        let t = Arc::clone(&t);
        async move { post(&client, &input, &t).await }
    });

    let ticks = if args.count.is_some() {
        handle.finished().await
    } else {
        tokio::signal::ctrl_c().await?;
        info!("stop requested");
        handle.stop().await
    };
    tally.print(ticks);
    Ok(())
}

/// One reading per journey stop, spread evenly over `duration_secs`.
pub async fn journey(ctx: &CliContext, batch_id: &str, duration_secs: u64) -> Result<()> {
    let stops: Vec<(&'static str, &'static str)> = JOURNEY
        .iter()
        .flat_map(|stage| stage.locations.iter().map(move |loc| (stage.name, *loc)))
        .collect();
    let interval = journey_interval(duration_secs, stops.len());
    info!(
        batch_id = %batch_id,
        stops = stops.len(),
        interval_ms = interval.as_millis() as u64,
        "journey started"
    );

    let tally = Arc::new(Tally::default());
    let mut sim = simulator(ctx);
    let client = ctx.client.clone();
    let batch_id = batch_id.to_string();
    let t = Arc::clone(&tally);
    let total = stops.len() as u64;

    let handle = spawn_monitor("journey", interval, Some(total), move |n| {
        let (stage, site) = stops[n as usize % stops.len()];
        let input = sim.reading(&batch_id, &[site]);
        println!("stage={}", stage);
        let client = client.clone();
        let t = Arc::clone(&t);
        async move { post(&client, &input, &t).await }
    });

    let (ticks, interrupted) = handle.finished_or(tokio::signal::ctrl_c()).await;
    if let Some(r) = interrupted {
        r?;
        info!(ticks, "journey interrupted");
    }
    tally.print(ticks);
    Ok(())
}

/// Spacing between journey stops, never below 1 ms.
fn journey_interval(duration_secs: u64, stops: usize) -> Duration {
    let stops = (stops as u64).max(1);
    Duration::from_millis((duration_secs.saturating_mul(1000) / stops).max(1))
}

pub async fn log_once(ctx: &CliContext, batch_id: &str, location: Option<&str>) -> Result<()> {
    let mut sim = simulator(ctx);
    let input = match location {
        Some(site) => sim.reading(batch_id, &[site]),
        None => sim.reading(batch_id, &ctx.route_or(&DEFAULT_ROUTE)),
    };
    let tally = Tally::default();
    post(&ctx.client, &input, &tally).await;
    if tally.failed.load(Ordering::SeqCst) > 0 {
        anyhow::bail!("reading for batch {} was not recorded", batch_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journey_interval_splits_duration_across_stops() {
        assert_eq!(journey_interval(70, 7), Duration::from_secs(10));
        assert_eq!(journey_interval(0, 7), Duration::from_millis(1));
        assert_eq!(journey_interval(5, 0), Duration::from_secs(5));
    }

    #[test]
    fn journey_interval_saturates_on_huge_durations() {
        let d = journey_interval(u64::MAX, 4);
        assert_eq!(d, Duration::from_millis(u64::MAX / 4));
    }
}
