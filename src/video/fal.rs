use super::{QueuedJob, SubmitRequest, VideoQueue};
use crate::error::{CoachError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_QUEUE_URL: &str = "https://queue.fal.run/fal-ai/ai-avatar";

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
    status_url: Option<String>,
    response_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

/// fal.ai async job queue client for the avatar generator
pub struct FalQueue {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FalQueue {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_QUEUE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }
}

#[async_trait::async_trait]
impl VideoQueue for FalQueue {
    async fn submit(&self, request: &SubmitRequest) -> Result<QueuedJob> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| CoachError::Enqueue(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CoachError::Enqueue(format!(
                "{} - {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| CoachError::Enqueue(format!("Malformed queue response: {}", e)))?;

        let status_url = parsed.status_url.unwrap_or_else(|| {
            format!("{}/requests/{}/status", self.base_url, parsed.request_id)
        });
        let response_url = parsed
            .response_url
            .unwrap_or_else(|| format!("{}/requests/{}", self.base_url, parsed.request_id));

        Ok(QueuedJob {
            request_id: parsed.request_id,
            status_url,
            response_url,
        })
    }

    async fn status(&self, job: &QueuedJob) -> Result<String> {
        let response = self
            .client
            .get(&job.status_url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| CoachError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CoachError::Connection(format!(
                "{} - {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| CoachError::Connection(format!("Malformed status response: {}", e)))?;

        Ok(parsed.status)
    }

    async fn result(&self, job: &QueuedJob) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(&job.response_url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| CoachError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CoachError::Connection(format!(
                "{} - {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CoachError::Connection(format!("Malformed result payload: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_urls_derived_from_request_id() {
        let queue = FalQueue::new("id:secret".to_string());
        assert_eq!(queue.base_url, DEFAULT_QUEUE_URL);

        // Same derivation the submit path uses when the provider omits URLs
        let status_url = format!("{}/requests/{}/status", queue.base_url, "abc123");
        assert_eq!(
            status_url,
            "https://queue.fal.run/fal-ai/ai-avatar/requests/abc123/status"
        );
    }

    #[test]
    fn test_auth_header_format() {
        let queue = FalQueue::new("id:secret".to_string());
        assert_eq!(queue.auth_header(), "Key id:secret");
    }
}
