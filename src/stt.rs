use crate::audio::AudioClip;
use crate::error::{CoachError, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Turns a sealed recording into plain text
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct SttConfig {
    pub model: String,
    pub language: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: None,
            temperature: Some(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct OpenAiTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    config: SttConfig,
}

impl OpenAiTranscriber {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, SttConfig::default())
    }

    pub fn with_config(api_key: String, config: SttConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            config,
        }
    }
}

#[async_trait::async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String> {
        if clip.is_empty() {
            return Err(CoachError::Transcription("Empty audio capture".to_string()));
        }

        let url = format!("{}/audio/transcriptions", self.base_url);

        let part = Part::bytes(clip.data.clone())
            .file_name("capture.wav")
            .mime_str(&clip.mime_type)
            .map_err(|e| CoachError::Transcription(format!("Invalid audio mime type: {}", e)))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "json");

        if let Some(ref language) = self.config.language {
            form = form.text("language", language.clone());
        }
        if let Some(temperature) = self.config.temperature {
            form = form.text("temperature", temperature.to_string());
        }

        log::debug!("STT: uploading {} bytes for transcription", clip.data.len());

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CoachError::Transcription(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CoachError::Transcription(format!(
                "{} - {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| CoachError::Transcription(format!("Malformed response: {}", e)))?;

        log::info!("STT: transcript '{}'", parsed.text);
        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SttConfig::default();
        assert_eq!(config.model, "whisper-1");
        assert_eq!(config.language, None);
        assert_eq!(config.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_empty_clip_rejected() {
        let stt = OpenAiTranscriber::new("sk-test".to_string());
        let clip = AudioClip::wav(vec![]);
        let err = stt.transcribe(&clip).await.unwrap_err();
        assert!(matches!(err, CoachError::Transcription(_)));
    }
}
