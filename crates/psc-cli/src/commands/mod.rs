//! Command handler modules for psc.
//!
//! Shared setup (config, API URL, client) lives here. Command-specific logic
//! lives in the submodules.

pub mod demo;
pub mod inspect;
pub mod simulate;

use std::path::Path;

use anyhow::Result;
use psc_config::{
    load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, ConfigMode, Settings,
    UnusedKeyPolicy,
};
use psc_schemas::BatchStatus;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ApiClient;

const DEFAULT_CONFIG: &str = "config/base.yaml";

pub struct CliContext {
    pub client: ApiClient,
    pub settings: Settings,
}

impl CliContext {
    /// API URL precedence: `--api`, then `PSC_API_URL`, then
    /// `simulator.api_url` from config.
    pub fn load(api: Option<String>, config_paths: &[String]) -> Result<Self> {
        let mut paths: Vec<&str> = config_paths.iter().map(String::as_str).collect();
        if paths.is_empty() && Path::new(DEFAULT_CONFIG).exists() {
            paths.push(DEFAULT_CONFIG);
        }
        let loaded = if paths.is_empty() {
            load_layered_yaml_from_strings(&[])?
        } else {
            load_layered_yaml(&paths)?
        };

        let report = report_unused_keys(
            ConfigMode::Simulate,
            &loaded.config_json,
            UnusedKeyPolicy::Warn,
        )?;
        debug!(
            unused = report.unused_leaf_pointers.len(),
            "config keys outside simulate mode"
        );

        let settings = loaded.settings()?.with_process_env()?;
        let base = api.unwrap_or_else(|| settings.simulator.api_url.clone());
        Ok(Self {
            client: ApiClient::new(&base)?,
            settings,
        })
    }

    /// Configured route, or `fallback` when none is set.
    pub fn route_or<'a>(&'a self, fallback: &[&'a str]) -> Vec<&'a str> {
        if self.settings.simulator.route.is_empty() {
            fallback.to_vec()
        } else {
            self.settings.simulator.route.iter().map(String::as_str).collect()
        }
    }
}

/// Label for a numeric status code from an API body.
pub fn status_label(v: &Value) -> &'static str {
    v.as_u64()
        .and_then(|c| u8::try_from(c).ok())
        .and_then(BatchStatus::from_code)
        .map(BatchStatus::label)
        .unwrap_or("Unknown")
}

pub fn str_field<'a>(v: &'a Value, key: &str) -> &'a str {
    v[key].as_str().unwrap_or("")
}

/// Warn and continue; for loops where one failed request must not end the run.
pub fn warn_failed(what: &str, err: &anyhow::Error) {
    warn!(error = %err, "{} failed", what);
}
