//! Typed settings from the shipped base config.
//!
//! GREEN when:
//! - config/base.yaml parses into Settings with the two temperature policies
//!   kept apart.
//! - A local override layer changes only what it names.
//! - Token mode without bindings is refused at load.

use std::path::Path;

use psc_config::{load_layered_yaml_from_strings, CredentialMode};

const BASE_YAML: &str = include_str!("../../../config/base.yaml");

#[test]
fn base_yaml_parses() {
    let s = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap().settings().unwrap();
    assert_eq!(s.bind_addr().unwrap().port(), 8899);
    assert_eq!(s.telemetry.transport.temperature.min, -10.0);
    assert_eq!(s.telemetry.transport.temperature.max, 25.0);
    assert_eq!(s.telemetry.live_lab.temperature.min, 28.0);
    assert_eq!(s.telemetry.live_lab.temperature.max, 33.0);
    assert_eq!(s.telemetry.ambient.location, "Lab");
    assert_eq!(s.credentials.mode, CredentialMode::Address);
    assert_eq!(s.ledger.journal_path.as_deref(), Some(Path::new("data/ledger.jsonl")));
    assert_eq!(s.simulator.interval_secs, 30);
}

#[test]
fn override_is_surgical() {
    let local = "ledger:\n  journal_path: null\ntelemetry:\n  live_lab:\n    temperature: { min: 27.0, max: 33.0 }\n";
    let s = load_layered_yaml_from_strings(&[BASE_YAML, local])
        .unwrap()
        .settings()
        .unwrap();
    assert!(s.ledger.journal_path.is_none());
    assert_eq!(s.telemetry.live_lab.temperature.min, 27.0);
    assert_eq!(s.telemetry.live_lab.humidity_max, 70.0);
    assert_eq!(s.telemetry.transport.temperature.min, -10.0);
}

#[test]
fn token_mode_needs_bindings() {
    let local = "credentials:\n  mode: token\n";
    let err = load_layered_yaml_from_strings(&[BASE_YAML, local])
        .unwrap()
        .settings()
        .unwrap_err();
    assert!(err.to_string().contains("credentials.tokens"));
}

#[test]
fn bad_bind_addr_is_refused() {
    let local = "daemon:\n  bind_addr: \"localhost\"\n";
    let err = load_layered_yaml_from_strings(&[BASE_YAML, local])
        .unwrap()
        .settings()
        .unwrap_err();
    assert!(err.to_string().contains("daemon.bind_addr"));
}
