//! psc-daemon entry point.
//!
//! Sets up tracing, loads layered config, opens the ledger, builds the shared
//! state, wires middleware and serves. Handlers live in `routes.rs`.
//!
//! Usage: `psc-daemon [config.yaml ...]` (default `config/base.yaml` when it
//! exists).

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use psc_config::{
    load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, secrets,
    CredentialMode, LoadedConfig, Settings, UnusedKeyPolicy,
};
use psc_daemon::auth::{AddressCredentials, Credentials, TokenCredentials};
use psc_daemon::{routes, state};
use psc_ledger::{Ledger, MemoryLedger};
use psc_telemetry::AmbientDefaults;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const DEFAULT_CONFIG: &str = "config/base.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    let report = report_unused_keys(
        psc_config::ConfigMode::Serve,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    for key in &report.unused_leaf_pointers {
        warn!(key = %key, "config key not read in serve mode");
    }
    let settings = loaded.settings()?.with_process_env()?;

    let ledger: Arc<dyn Ledger> = match &settings.ledger.journal_path {
        Some(path) => Arc::new(
            MemoryLedger::open_journaled(path)
                .with_context(|| format!("open ledger journal {}", path.display()))?,
        ),
        None => {
            warn!("no ledger.journal_path configured; ledger is in-memory only");
            Arc::new(MemoryLedger::new())
        }
    };

    let credentials = build_credentials(&settings)?;
    let ambient = AmbientDefaults {
        location: settings.telemetry.ambient.location.clone(),
        humidity: settings.telemetry.ambient.humidity,
        pressure: settings.telemetry.ambient.pressure,
    };

    let shared = Arc::new(
        state::AppState::new(ledger)
            .with_credentials(credentials)
            .with_policies(state::Policies::from_settings(&settings.telemetry))
            .with_ambient(ambient)
            .with_config_hash(loaded.config_hash.clone()),
    );

    state::spawn_heartbeat(
        Arc::clone(&shared),
        Duration::from_secs(settings.daemon.heartbeat_secs),
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only(&settings.daemon.cors_origins));

    let addr = settings.bind_addr()?;
    info!(
        config_hash = %loaded.config_hash,
        credential_mode = shared.credentials.mode(),
        "psc-daemon listening on http://{}",
        addr
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    info!("psc-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config() -> anyhow::Result<LoadedConfig> {
    let mut paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() && Path::new(DEFAULT_CONFIG).exists() {
        paths.push(DEFAULT_CONFIG.to_string());
    }
    if paths.is_empty() {
        warn!("no config files; using built-in defaults");
        return load_layered_yaml_from_strings(&[]);
    }
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    load_layered_yaml(&refs)
}

fn build_credentials(settings: &Settings) -> anyhow::Result<Arc<dyn Credentials>> {
    Ok(match settings.credentials.mode {
        CredentialMode::Address => {
            warn!("credential mode is 'address': any caller can act as any address");
            Arc::new(AddressCredentials)
        }
        CredentialMode::Token => {
            let tokens = secrets::resolve_tokens(&settings.credentials)?;
            let creds = TokenCredentials::from_resolved(&tokens)
                .context("credentials.tokens holds an invalid address")?;
            info!(bindings = creds.len(), "token credentials loaded");
            Arc::new(creds)
        }
    })
}

/// CORS: localhost origins plus whatever the config adds.
fn cors_localhost_only(extra: &[String]) -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
}
