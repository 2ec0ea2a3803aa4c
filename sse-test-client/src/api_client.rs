use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// Body of `POST /events`.
#[derive(Debug, Default, Serialize)]
pub struct PublishRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stats {
    pub subscribers: usize,
    pub published: u64,
    pub dropped: u64,
    pub closed: bool,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub fn stream_url(&self) -> String {
        format!("{}/events/stream", self.base_url)
    }

    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Health check failed: {}", response.status());
        }

        Ok(())
    }

    /// Publishes an event and returns the status the server answered with.
    pub async fn publish(&self, request: &PublishRequest) -> Result<StatusCode> {
        let url = format!("{}/events", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .context("Failed to publish event")?;

        Ok(response.status())
    }

    pub async fn stats(&self) -> Result<Stats> {
        let url = format!("{}/events/stats", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get broadcaster stats")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Failed to get stats: {} - Response: {}", status, body);
        }

        let api_response: Value = response.json().await.context("Failed to parse response")?;

        // Extract the data from ApiResponse wrapper
        serde_json::from_value(api_response["data"].clone()).context("No stats in response")
    }
}
