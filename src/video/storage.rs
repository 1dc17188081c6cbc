use crate::config::VideoCredentials;
use crate::error::{CoachError, Result};
use reqwest::Client;
use std::time::Duration;

/// Durable object storage that serves uploads from a public URL
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` under `key` and return the publicly resolvable URL
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// HTTP bucket storage (Supabase-style object API): POST the bytes to
/// `{upload_base}/{key}`, serve them from `{public_base}/{key}`.
pub struct BucketStore {
    client: Client,
    upload_base: String,
    public_base: String,
    api_key: String,
}

impl BucketStore {
    pub fn new(upload_base: String, public_base: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            upload_base: upload_base.trim_end_matches('/').to_string(),
            public_base: public_base.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_credentials(credentials: &VideoCredentials) -> Self {
        Self::new(
            credentials.storage_upload_url.clone(),
            credentials.storage_public_url.clone(),
            credentials.storage_key().to_string(),
        )
    }
}

#[async_trait::async_trait]
impl ObjectStore for BucketStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = format!("{}/{}", self.upload_base, key);
        log::debug!("Storage: uploading {} bytes to {}", bytes.len(), url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| CoachError::AudioUpload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CoachError::AudioUpload(format!(
                "{} - {}",
                status.as_u16(),
                body
            )));
        }

        Ok(format!("{}/{}", self.public_base, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slashes_normalized() {
        let store = BucketStore::new(
            "https://host/upload/".to_string(),
            "https://host/public/".to_string(),
            "key".to_string(),
        );
        assert_eq!(store.upload_base, "https://host/upload");
        assert_eq!(store.public_base, "https://host/public");
    }
}
