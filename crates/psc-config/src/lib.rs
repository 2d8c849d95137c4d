//! Layered YAML configuration.
//!
//! Documents merge in order (later overrides earlier), the merged tree is
//! rendered as canonical JSON (sorted keys, no whitespace) and hashed with
//! SHA-256. The hash identifies the effective config in logs and `/api/health`.
//!
//! Credentials never live in YAML. The config names env vars; values are
//! resolved at startup by [`secrets`].

use std::fs;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

mod consumption;
pub mod secrets;
mod settings;

pub use consumption::{
    consumed_pointers_for_mode, report_unused_keys, ConfigMode, UnusedKeyPolicy, UnusedKeyReport,
};
pub use settings::{
    AmbientSettings, BandSettings, CredentialMode, CredentialSettings, DaemonSettings,
    LedgerSettings, PolicySettings, Settings, SimulatorSettings, TelemetrySettings, TokenBinding,
    ENV_API_URL, ENV_DAEMON_ADDR,
};

/// Leaf strings starting with one of these are treated as pasted credentials.
const SECRET_PREFIXES: &[&str] = &[
    "-----BEGIN", // PEM blocks
    "sk-",
    "sk_live",
    "sk_test",
    "ghp_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged tree, with defaults for missing sections.
    pub fn settings(&self) -> Result<Settings> {
        Settings::from_config_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs = Vec::with_capacity(paths.len());
    for p in paths {
        let raw = fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml (layer {i})"))?;
        let doc = serde_json::to_value(doc).context("yaml->json conversion failed")?;
        // An empty layer parses as null and must not wipe the base.
        if doc.is_null() {
            continue;
        }
        merged = deep_merge(merged, doc);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(base: Value, over: Value) -> Value {
    match (base, over) {
        (Value::Object(mut base), Value::Object(over)) => {
            for (k, v) in over {
                let prior = base.remove(&k).unwrap_or(Value::Null);
                base.insert(k, deep_merge(prior, v));
            }
            Value::Object(base)
        }
        (_, other) => other,
    }
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(&sort_keys(v)).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    consumption::collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

/// A 32-byte hex string is a signing key; a 20-byte one is just an address.
fn is_raw_private_key(s: &str) -> bool {
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    body.len() == 64 && body.bytes().all(|b| b.is_ascii_hexdigit())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    is_raw_private_key(t) || SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
