//! HTTP(S) endpoint probes.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use monic_core::config::EndpointCheck;
use monic_core::{EndpointProber, EndpointResult, MonitorError, Result};
use reqwest::{Client, Method};
use tracing::debug;

const USER_AGENT: &str = "Monic-Monitor/1.0";

pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MonitorError::Probe(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointProber for HttpProber {
    async fn probe(&self, check: &EndpointCheck) -> Result<EndpointResult> {
        let method = Method::from_bytes(check.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| MonitorError::Probe(format!("invalid HTTP method: {}", check.method)))?;

        let mut result = EndpointResult {
            name: check.name.clone(),
            url: check.url.clone(),
            status_code: None,
            latency_ms: 0,
            success: false,
            error: None,
            timestamp: Utc::now(),
        };

        debug!(endpoint = %check.name, url = %check.url, "Probing endpoint");
        let started = Instant::now();
        let response = self
            .client
            .request(method, &check.url)
            .header(reqwest::header::ACCEPT, "*/*")
            .timeout(check.timeout())
            .send()
            .await;
        result.latency_ms = started.elapsed().as_millis() as u64;

        let mut response = match response {
            Ok(response) => response,
            Err(e) => {
                result.error = Some(format!("request failed: {}", e));
                return Ok(result);
            }
        };

        // Pull the first chunk so a half-open connection shows up as a failure
        if let Err(e) = response.chunk().await {
            result.error = Some(format!("failed to read response body: {}", e));
            return Ok(result);
        }

        let status = response.status().as_u16();
        result.status_code = Some(status);
        if status == check.expected_status {
            result.success = true;
        } else {
            result.error = Some(format!(
                "unexpected status code: {} (expected: {})",
                status, check.expected_status
            ));
        }
        Ok(result)
    }
}
