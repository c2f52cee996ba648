//! API client for communicating with the serving sidecar

use anyhow::{Context, Result};
use modelfox::sync::QueueStats;
use modelfox::{LogPredictionArgs, LogTrueValueArgs, PredictInputs, PredictOptions, PredictOutputs};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the sidecar
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid server URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request to a probe endpoint, which reports its state in a 503 body too
    async fn get_probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn model_id(&self) -> Result<String> {
        let response: ModelIdResponse = self.get("id").await?;
        Ok(response.model_id)
    }

    pub async fn predict(
        &self,
        inputs: PredictInputs,
        options: Option<PredictOptions>,
    ) -> Result<PredictOutputs> {
        self.post("predict", &PredictRequest { inputs, options })
            .await
    }

    pub async fn log_prediction(&self, args: &LogPredictionArgs) -> Result<QueueResponse> {
        self.post("log/prediction", args).await
    }

    pub async fn log_true_value(&self, args: &LogTrueValueArgs) -> Result<QueueResponse> {
        self.post("log/true_value", args).await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.get("log/queue").await
    }

    pub async fn flush(&self) -> Result<FlushResponse> {
        self.post("flush", &serde_json::json!({})).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_probe("healthz").await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        self.get_probe("readyz").await
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelIdResponse {
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub inputs: PredictInputs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<PredictOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueResponse {
    pub queued: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushResponse {
    pub sent: usize,
    pub queued: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
