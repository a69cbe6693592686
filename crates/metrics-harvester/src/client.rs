// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::batch::DrainedBatch;
use crate::config::HarvesterConfig;
use crate::constants::METRIC_API_PATH;
use crate::errors::{ConfigError, DeliveryError};
use crate::metric::Tags;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of one delivery attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliveryResponse {
    pub ok: bool,
    /// Absent when the request never got a response.
    pub status: Option<StatusCode>,
    pub reason: String,
}

impl DeliveryResponse {
    pub fn from_status(status: StatusCode, reason: impl Into<String>) -> Self {
        DeliveryResponse {
            ok: status.is_success(),
            status: Some(status),
            reason: reason.into(),
        }
    }

    pub fn transport_failure(reason: impl Into<String>) -> Self {
        DeliveryResponse {
            ok: false,
            status: None,
            reason: reason.into(),
        }
    }
}

/// Ships drained batches to the telemetry endpoint.
///
/// Transport failures must be reported as a non-ok [`DeliveryResponse`];
/// `Err` is reserved for conditions that make the batch unsendable.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send_batch(&self, batch: &DrainedBatch) -> Result<DeliveryResponse, DeliveryError>;
}

#[derive(Serialize)]
struct Payload<'a> {
    common: Common<'a>,
    metrics: Vec<WireMetric<'a>>,
}

#[derive(Serialize)]
struct Common<'a> {
    attributes: &'a Tags,
    timestamp: u64,
    #[serde(rename = "interval.ms")]
    interval_ms: u64,
}

#[derive(Serialize)]
struct WireMetric<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<&'a Tags>,
}

fn encode(batch: &DrainedBatch) -> Result<Vec<u8>, DeliveryError> {
    let payload = Payload {
        common: Common {
            attributes: &batch.common_attributes,
            timestamp: batch.timestamp_ms,
            interval_ms: batch.interval_ms,
        },
        metrics: batch
            .observations
            .iter()
            .map(|observation| WireMetric {
                name: observation.name(),
                kind: observation.kind(),
                value: observation.value(),
                attributes: observation.tags(),
            })
            .collect(),
    };
    serde_json::to_vec(&[payload]).map_err(|e| DeliveryError::Payload(e.to_string()))
}

/// HTTP client for the New Relic Metric API.
#[derive(Clone)]
pub struct MetricClient {
    client: reqwest::Client,
    url: String,
    insert_key: String,
}

impl MetricClient {
    pub fn new(config: &HarvesterConfig) -> Result<Self, ConfigError> {
        let client = build_client(config.https_proxy.as_deref(), config.timeout)
            .map_err(|e| ConfigError::Invalid(format!("unable to build HTTP client: {e}")))?;
        Ok(MetricClient {
            client,
            url: endpoint(&config.host),
            insert_key: config.insert_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn build_client(proxy_url: Option<&str>, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().use_rustls_tls().timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    builder.build()
}

/// Hosts are plain hostnames; a scheme is honoured when given so that the
/// endpoint can point at a local collector.
fn endpoint(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}{METRIC_API_PATH}")
    } else {
        format!("https://{host}{METRIC_API_PATH}")
    }
}

impl std::fmt::Debug for MetricClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricClient").field("url", &self.url).finish()
    }
}

#[async_trait]
impl DeliveryClient for MetricClient {
    async fn send_batch(&self, batch: &DrainedBatch) -> Result<DeliveryResponse, DeliveryError> {
        let body = encode(batch)?;
        let time = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header("Api-Key", &self.insert_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;
        let elapsed = time.elapsed();

        match response {
            Ok(r) => {
                let status = r.status();
                debug!(
                    "Sent {} metrics in {} ms, status {status}",
                    batch.len(),
                    elapsed.as_millis()
                );
                let reason = if status.is_success() {
                    String::new()
                } else {
                    r.text().await.unwrap_or_default()
                };
                Ok(DeliveryResponse::from_status(status, reason))
            }
            Err(e) => Ok(DeliveryResponse {
                ok: false,
                status: e.status(),
                reason: e.to_string(),
            }),
        }
    }
}
