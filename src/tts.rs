use crate::error::{CoachError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use strum::{Display, EnumString};

/// Output container requested from the synthesis endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AudioFormat {
    /// Raw 16-bit 24 kHz mono PCM, played straight to the device
    Pcm,
    /// MP3, used where the artifact is uploaded or handed to the user
    Mp3,
}

impl AudioFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            AudioFormat::Pcm => "audio/pcm",
            AudioFormat::Mp3 => "audio/mpeg",
        }
    }
}

#[derive(Debug)]
pub struct SynthesizedAudio {
    pub data: Vec<u8>,
    pub format: AudioFormat,
}

impl SynthesizedAudio {
    /// Base64 form used for the `{audioContent: ...}` wire shape and for
    /// data-URI fallbacks
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    /// A data URI the caller can hand to the user when no hosted URL exists
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.to_base64())
    }
}

/// Converts assistant text into speech audio
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio>;
}

#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub voice: String,
    pub model: String,
    pub format: AudioFormat,
    pub speed: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            model: "tts-1".to_string(),
            format: AudioFormat::Pcm,
            speed: 1.0,
        }
    }
}

impl TtsConfig {
    /// Config used by the video pipeline, where the artifact gets uploaded
    pub fn mp3() -> Self {
        Self {
            format: AudioFormat::Mp3,
            ..Self::default()
        }
    }
}

pub struct OpenAiTts {
    client: Client,
    api_key: String,
    base_url: String,
    config: TtsConfig,
}

impl OpenAiTts {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, TtsConfig::default())
    }

    pub fn with_config(api_key: String, config: TtsConfig) -> Self {
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

    pub fn set_voice(&mut self, voice: String) {
        self.config.voice = voice;
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        let payload = json!({
            "model": self.config.model,
            "input": text,
            "voice": self.config.voice,
            "response_format": self.config.format.to_string(),
            "speed": self.config.speed,
        });

        log::debug!(
            "TTS: synthesizing {} chars as {} with voice '{}'",
            text.chars().count(),
            self.config.format,
            self.config.voice
        );

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| CoachError::Tts(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CoachError::Tts(format!("{} - {}", status.as_u16(), body)));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| CoachError::Tts(e.to_string()))?
            .to_vec();

        log::debug!("TTS: received {} bytes", data.len());

        Ok(SynthesizedAudio {
            data,
            format: self.config.format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TtsConfig::default();
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.model, "tts-1");
        assert_eq!(config.format, AudioFormat::Pcm);
        assert_eq!(config.speed, 1.0);
    }

    #[test]
    fn test_mp3_config() {
        assert_eq!(TtsConfig::mp3().format, AudioFormat::Mp3);
    }

    #[test]
    fn test_format_wire_names() {
        assert_eq!(AudioFormat::Pcm.to_string(), "pcm");
        assert_eq!(AudioFormat::Mp3.to_string(), "mp3");
        assert_eq!(AudioFormat::Mp3.mime_type(), "audio/mpeg");
    }

    #[test]
    fn test_data_uri() {
        let audio = SynthesizedAudio {
            data: vec![1, 2, 3],
            format: AudioFormat::Mp3,
        };
        let uri = audio.to_data_uri();
        assert!(uri.starts_with("data:audio/mpeg;base64,"));
        assert_eq!(audio.to_base64(), "AQID");
    }
}
