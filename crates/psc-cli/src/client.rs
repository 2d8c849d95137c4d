//! Thin JSON client for the psc-daemon API.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use psc_telemetry::SensorInput;
use serde_json::{json, Value};

/// A `{ success: false }` answer from the daemon.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    pub status: u16,
    pub kind: Option<String>,
    pub message: String,
}

impl ApiFailure {
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Some(k) => write!(f, "HTTP {} {}: {}", self.status, k, self.message),
            None => write!(f, "HTTP {}: {}", self.status, self.message),
        }
    }
}

impl std::error::Error for ApiFailure {}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request failed: GET {url}"))?;
        decode(resp).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request failed: POST {url}"))?;
        decode(resp).await
    }

    pub async fn register_user(&self, address: &str, name: &str, role: u8) -> Result<Value> {
        self.post(
            "/api/users/register",
            &json!({ "address": address, "name": name, "role": role }),
        )
        .await
    }

    pub async fn create_batch(&self, actor: &str, batch_id: &str, drug_name: &str) -> Result<Value> {
        self.post(
            "/api/drugs/create",
            &json!({ "batchId": batch_id, "drugName": drug_name, "actorCredential": actor }),
        )
        .await
    }

    /// `stage` is one of manufacturer, repackager, distributor, pharmacy.
    pub async fn transfer(
        &self,
        stage: &str,
        actor: &str,
        batch_id: &str,
        recipient: &str,
        location: Option<&str>,
    ) -> Result<Value> {
        self.post(
            &format!("/api/drugs/transfer/{stage}"),
            &json!({
                "batchId": batch_id,
                "recipientAddress": recipient,
                "location": location,
                "actorCredential": actor,
            }),
        )
        .await
    }

    pub async fn batch_action(&self, path: &str, actor: &str, batch_id: &str) -> Result<Value> {
        self.post(path, &json!({ "batchId": batch_id, "actorCredential": actor }))
            .await
    }

    pub async fn approve(&self, actor: &str, batch_id: &str, remarks: &str) -> Result<Value> {
        self.post(
            "/api/fda/approve",
            &json!({ "batchId": batch_id, "remarks": remarks, "actorCredential": actor }),
        )
        .await
    }

    pub async fn log_reading(&self, input: &SensorInput) -> Result<Value> {
        let gps = input.location.gps;
        self.post(
            "/api/iot/log",
            &json!({
                "batchId": input.batch_id,
                "location": input.location.name,
                "latitude": gps.map(|g| g.latitude),
                "longitude": gps.map(|g| g.longitude),
                "temperature": input.temperature,
                "humidity": input.humidity,
                "pressure": input.pressure,
                "tamperDetected": input.tamper_detected,
            }),
        )
        .await
    }
}

async fn decode(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .with_context(|| format!("HTTP {status}: response is not JSON"))?;
    if status.is_success() && body["success"] != Value::Bool(false) {
        return Ok(body);
    }
    Err(ApiFailure {
        status: status.as_u16(),
        kind: body["kind"].as_str().map(str::to_string),
        message: body["error"]
            .as_str()
            .unwrap_or("request failed")
            .to_string(),
    }
    .into())
}
