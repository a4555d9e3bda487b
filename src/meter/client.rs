use crate::error::{AppError, Result};
use crate::meter::{MeterSource, RawReading};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the meter's local API v1. Never retries; the collector
/// owns the retry cadence.
#[derive(Clone)]
pub struct MeterClient {
    http: reqwest::Client,
    url: String,
}

impl MeterClient {
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: format!("http://{}/api/v1/data", host),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MeterSource for MeterClient {
    async fn fetch(&self) -> Result<RawReading> {
        let response = self.http.get(&self.url).send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        debug!(url = %self.url, "meter responded");
        RawReading::from_json(&body)
    }
}
