//! HTTP client for a running aqmon agent

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the agent's status and control endpoints
pub struct AgentClient {
    client: Client,
    base_url: Url,
}

impl AgentClient {
    /// Create a client for the agent at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid agent URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        self.send(self.client.get(url)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path)?;
        self.send(self.client.post(url).json(body)).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid agent path '{}'", path))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Agent at {} is unreachable", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Agent error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse agent response")
    }
}

// Agent response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetThresholds {
    pub warn_mb: f64,
    pub critical_mb: f64,
    pub emergency_mb: f64,
    pub hard_max_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardStatus {
    pub state: String,
    pub usage_mb: Option<f64>,
    pub budget: BudgetThresholds,
    pub cleanup_passes: u64,
    pub reload_requested: bool,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub name: String,
    pub entries: usize,
    pub items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub guard: GuardStatus,
    pub caches: Vec<CacheStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupRequest {
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub accepted: bool,
    pub severity: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = AgentClient::new("http://monitor:9100").unwrap();
        assert_eq!(client.endpoint("status").unwrap().as_str(), "http://monitor:9100/status");
        assert_eq!(client.base_url().port(), Some(9100));
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(AgentClient::new("not a url").is_err());
    }

    #[test]
    fn test_status_deserializes_agent_payload() {
        let body = serde_json::json!({
            "guard": {
                "state": "warn",
                "usage_mb": 85.0,
                "budget": {"warn_mb": 80.0, "critical_mb": 120.0, "emergency_mb": 140.0, "hard_max_mb": 150.0},
                "cleanup_passes": 2,
                "last_cleanup": null,
                "reload_requested": false,
                "updated_at": "2024-06-15T12:00:00Z"
            },
            "caches": [{"name": "image-cache", "entries": 1, "items": 64}]
        });

        let status: AgentStatus = serde_json::from_value(body).unwrap();
        assert_eq!(status.guard.state, "warn");
        assert_eq!(status.caches[0].items, 64);
    }
}
