//! Shared runtime state for psc-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The ledger sits behind
//! the custody service and the telemetry evaluator, which share one
//! `Arc<dyn Ledger>`.

use std::sync::Arc;
use std::time::Duration;

use psc_config::{PolicySettings, TelemetrySettings};
use psc_custody::CustodyService;
use psc_ledger::Ledger;
use psc_telemetry::{AmbientDefaults, Band, PolicyKind, TelemetryEvaluator, ThresholdPolicy};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::auth::{AddressCredentials, Credentials};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
        unresolved_alerts: usize,
    },
    Transition {
        batch_id: String,
        transition: String,
        status: u8,
        owner: String,
        seq: u64,
    },
    Alert {
        alert_id: u64,
        batch_id: String,
        alert_type: u8,
        message: String,
    },
    AlertResolved {
        alert_id: u64,
        resolved_by: String,
    },
    Reading {
        batch_id: String,
        reading_id: u64,
        temperature: f64,
        alerts_raised: usize,
    },
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Transition { .. } => "transition",
            BusMsg::Alert { .. } | BusMsg::AlertResolved { .. } => "alert",
            BusMsg::Reading { .. } => "reading",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo / LiveSnapshot
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Last bench reading posted to `/api/live-temperature`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub temperature: f64,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub location: String,
    pub humidity: f64,
    pub pressure: f64,
}

/// The two temperature policies, kept apart.
#[derive(Clone, Debug, PartialEq)]
pub struct Policies {
    /// `/api/iot/log`
    pub transport: ThresholdPolicy,
    /// `/api/live-temperature`
    pub live_lab: ThresholdPolicy,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            transport: ThresholdPolicy::transport(),
            live_lab: ThresholdPolicy::live_lab(),
        }
    }
}

impl Policies {
    pub fn from_settings(t: &TelemetrySettings) -> Self {
        Self {
            transport: policy_from(PolicyKind::Transport, &t.transport),
            live_lab: policy_from(PolicyKind::LiveLab, &t.live_lab),
        }
    }
}

fn policy_from(kind: PolicyKind, p: &PolicySettings) -> ThresholdPolicy {
    ThresholdPolicy {
        kind,
        temperature: Band::new(p.temperature.min, p.temperature.max),
        humidity_max: p.humidity_max,
        pressure: Band::new(p.pressure.min, p.pressure.max),
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub custody: CustodyService,
    pub telemetry: TelemetryEvaluator,
    pub credentials: Arc<dyn Credentials>,
    pub policies: Policies,
    pub ambient: AmbientDefaults,
    pub live: Arc<RwLock<Option<LiveSnapshot>>>,
    pub config_hash: Option<String>,
}

impl AppState {
    /// Address credentials and the default policies. Use the `with_*`
    /// builders to override.
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "psc-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            custody: CustodyService::new(Arc::clone(&ledger)),
            telemetry: TelemetryEvaluator::new(ledger),
            credentials: Arc::new(AddressCredentials),
            policies: Policies::default(),
            ambient: AmbientDefaults::default(),
            live: Arc::new(RwLock::new(None)),
            config_hash: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_policies(mut self, policies: Policies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_ambient(mut self, ambient: AmbientDefaults) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Fire-and-forget; no subscribers is not an error.
    pub fn publish(&self, msg: BusMsg) {
        if self.bus.send(msg).is_err() {
            debug!("bus has no subscribers");
        }
    }
}

/// Spawn a background task that emits a heartbeat SSE every `interval`,
/// carrying the current unresolved-alert count.
pub fn spawn_heartbeat(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let st = Arc::clone(&state);
            let unresolved_alerts = tokio::task::spawn_blocking(move || st.custody.ledger().counts())
                .await
                .ok()
                .and_then(Result::ok)
                .map_or(0, |c| c.unresolved_alerts);
            state.publish(BusMsg::Heartbeat {
                ts_millis: chrono::Utc::now().timestamp_millis(),
                unresolved_alerts,
            });
        }
    });
}
