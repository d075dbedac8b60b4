//! API client for the agent's HTTP endpoints

use anyhow::{Context, Result};
use hvac_agent_lib::{AgentStatus, LabeledSample, SensorSnapshot};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for a running hvac-agent
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

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

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

    pub async fn status(&self) -> Result<AgentStatus> {
        self.get("api/v1/status").await
    }

    pub async fn sensor_data(&self) -> Result<SensorSnapshot> {
        self.get("sensor_data").await
    }

    /// Queue a labeled sample for the agent's retrain worker
    pub async fn submit_sample(&self, sample: &LabeledSample) -> Result<QueuedResponse> {
        self.post("api/v1/samples", sample).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sensor_data_parses_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sensor_data")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"temperature":24.5,"humidity":55.0,"co2_level":400,"occupancy":1}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let snapshot = client.sensor_data().await.unwrap();

        mock.assert_async().await;
        assert_eq!(snapshot.temperature, 24.5);
        assert_eq!(snapshot.occupancy, 1);
    }

    #[tokio::test]
    async fn test_submit_sample_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/samples")
            .with_status(503)
            .with_body(r#"{"error":"retrain queue is full"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let sample = LabeledSample {
            snapshot: SensorSnapshot::default(),
            desired_temperature: 21.0,
        };
        let err = client.submit_sample(&sample).await.unwrap_err();

        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("queue is full"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
