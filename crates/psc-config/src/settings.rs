//! Typed view over the merged config tree.
//!
//! Every section is optional; missing keys take the values below, which match
//! `config/base.yaml`.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Overrides `daemon.bind_addr`.
pub const ENV_DAEMON_ADDR: &str = "PSC_DAEMON_ADDR";
/// Overrides `simulator.api_url`.
pub const ENV_API_URL: &str = "PSC_API_URL";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub ledger: LedgerSettings,
    pub credentials: CredentialSettings,
    pub telemetry: TelemetrySettings,
    pub simulator: SimulatorSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub bind_addr: String,
    /// Extra browser origins on top of localhost/127.0.0.1.
    pub cors_origins: Vec<String>,
    pub heartbeat_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8899".to_string(),
            cors_origins: Vec::new(),
            heartbeat_secs: 5,
        }
    }
}

/// `journal_path: null` keeps the ledger in memory only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub journal_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    /// The credential is the actor's address. Local demos only.
    #[default]
    Address,
    /// Opaque bearer tokens, each bound to one address.
    Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    pub address: String,
    /// Name of the env var holding the token, never the token itself.
    pub token_env: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub mode: CredentialMode,
    pub tokens: Vec<TokenBinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSettings {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySettings {
    pub temperature: BandSettings,
    pub humidity_max: f64,
    pub pressure: BandSettings,
}

impl PolicySettings {
    fn with_temperature(min: f64, max: f64) -> Self {
        Self {
            temperature: BandSettings { min, max },
            humidity_max: 70.0,
            pressure: BandSettings {
                min: 95.0,
                max: 105.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientSettings {
    pub location: String,
    pub humidity: f64,
    pub pressure: f64,
}

impl Default for AmbientSettings {
    fn default() -> Self {
        Self {
            location: "Lab".to_string(),
            humidity: 0.0,
            pressure: 101.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub transport: PolicySettings,
    pub live_lab: PolicySettings,
    pub ambient: AmbientSettings,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            transport: PolicySettings::with_temperature(-10.0, 25.0),
            live_lab: PolicySettings::with_temperature(28.0, 33.0),
            ambient: AmbientSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub api_url: String,
    pub interval_secs: u64,
    pub anomaly_chance: f64,
    /// Empty means the simulator's built-in route.
    pub route: Vec<String>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8899".to_string(),
            interval_secs: 30,
            anomaly_chance: 0.05,
            route: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let settings: Settings =
            serde_json::from_value(config.clone()).context("config does not match settings schema")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `PSC_DAEMON_ADDR` / `PSC_API_URL` from the process environment.
    pub fn with_process_env(self) -> Result<Self> {
        self.with_env(|name| std::env::var(name).ok())
    }

    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(addr) = non_empty(ENV_DAEMON_ADDR) {
            self.daemon.bind_addr = addr.trim().to_string();
        }
        if let Some(url) = non_empty(ENV_API_URL) {
            self.simulator.api_url = url.trim().trim_end_matches('/').to_string();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.daemon
            .bind_addr
            .parse()
            .with_context(|| format!("daemon.bind_addr is not host:port: {}", self.daemon.bind_addr))
    }

    fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        if self.daemon.heartbeat_secs == 0 {
            bail!("daemon.heartbeat_secs must be > 0");
        }
        for (name, p) in [
            ("transport", &self.telemetry.transport),
            ("live_lab", &self.telemetry.live_lab),
        ] {
            check_band(&format!("telemetry.{name}.temperature"), p.temperature)?;
            check_band(&format!("telemetry.{name}.pressure"), p.pressure)?;
            if !(0.0..=100.0).contains(&p.humidity_max) {
                bail!("telemetry.{name}.humidity_max must be within 0..=100");
            }
        }
        if self.simulator.interval_secs == 0 {
            bail!("simulator.interval_secs must be > 0");
        }
        if !(0.0..=1.0).contains(&self.simulator.anomaly_chance) {
            bail!("simulator.anomaly_chance must be within 0..=1");
        }
        if self.credentials.mode == CredentialMode::Token && self.credentials.tokens.is_empty() {
            bail!("credentials.mode=token requires at least one credentials.tokens entry");
        }
        Ok(())
    }
}

fn check_band(name: &str, band: BandSettings) -> Result<()> {
    if !band.min.is_finite() || !band.max.is_finite() || band.min > band.max {
        bail!("{name}: min must be <= max (got {} .. {})", band.min, band.max);
    }
    Ok(())
}
