//! Two-stage avatar video generation: script -> speech audio -> avatar video.
//!
//! Every failure after audio synthesis is downgraded to a structured
//! `VideoOutcome` so the caller always gets a usable artifact (at minimum
//! the synthesized audio) for a manual fallback; a slow or flaky provider
//! must never leave the user with nothing.

pub mod fal;
pub mod storage;

pub use fal::FalQueue;
pub use storage::{BucketStore, ObjectStore};

use crate::config::VideoConfig;
use crate::error::Result;
use crate::tts::SpeechSynthesizer;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use strum::Display;

/// Stages of one generation job, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JobStage {
    AudioSynthesis,
    Uploading,
    Queued,
    Polling,
    Completed,
    Failed,
}

/// Structured failure reasons carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    AudioUploadFailed,
    EnqueueFailed,
    FalApiError,
    GenerationTimeout,
    NoVideoUrlFound,
}

/// The `{success, videoUrl?, audioUrl?, error?, status?, message?}` wire shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VideoOutcome {
    fn completed(video_url: String, audio_url: String) -> Self {
        Self {
            success: true,
            video_url: Some(video_url),
            audio_url: Some(audio_url),
            error: None,
            status: None,
            message: None,
        }
    }

    fn failure(error: FailureKind, audio_url: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            video_url: None,
            audio_url,
            error: Some(error),
            status: None,
            message: Some(message.into()),
        }
    }

    fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Submission payload for the avatar provider
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub image_url: String,
    pub audio_url: String,
    pub resolution: String,
}

/// Handle to a queued provider job
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub request_id: String,
    pub status_url: String,
    pub response_url: String,
}

/// Async job queue of the video provider
#[async_trait::async_trait]
pub trait VideoQueue: Send + Sync {
    async fn submit(&self, request: &SubmitRequest) -> Result<QueuedJob>;
    async fn status(&self, job: &QueuedJob) -> Result<String>;
    async fn result(&self, job: &QueuedJob) -> Result<serde_json::Value>;
}

/// Statuses after which no further polling occurs
const TERMINAL_STATUSES: [&str; 4] = ["COMPLETED", "FAILED", "ERROR", "CANCELLED"];

fn is_terminal(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

/// Deterministic char-boundary truncation; identity at or below the limit.
/// Keeps synthesized audio under the provider's 60-second cap.
pub fn truncate_script(script: &str, max_chars: usize) -> Cow<'_, str> {
    if script.chars().count() <= max_chars {
        Cow::Borrowed(script)
    } else {
        Cow::Owned(script.chars().take(max_chars).collect())
    }
}

/// Ordered extraction rules for the video URL; first match wins.
/// Precedence is a contract: `video.url`, then `video_url`, then `url`.
pub fn extract_video_url(payload: &serde_json::Value) -> Option<String> {
    const RULES: [fn(&serde_json::Value) -> Option<&str>; 3] = [
        |v| v.get("video")?.get("url")?.as_str(),
        |v| v.get("video_url")?.as_str(),
        |v| v.get("url")?.as_str(),
    ];
    RULES.iter().find_map(|rule| rule(payload).map(str::to_string))
}

pub struct VideoPipeline<S>
where
    S: SpeechSynthesizer,
{
    synthesizer: Arc<S>,
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn VideoQueue>,
    config: VideoConfig,
}

impl<S> VideoPipeline<S>
where
    S: SpeechSynthesizer,
{
    pub fn new(
        synthesizer: Arc<S>,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn VideoQueue>,
        config: VideoConfig,
    ) -> Self {
        Self {
            synthesizer,
            store,
            queue,
            config,
        }
    }

    /// Run one generation job to a terminal outcome. Returns `Err` only
    /// when no artifact exists yet (synthesis failure); everything after
    /// that is reported as a structured outcome.
    pub async fn generate(&self, script: &str, image_url: &str) -> Result<VideoOutcome> {
        let script = truncate_script(script, self.config.script_max_chars);
        log::info!(
            "Video: starting job, {} chars of script, image {}",
            script.chars().count(),
            image_url
        );

        // Stage 1: synthesize speech. Fatal, nothing to fall back to.
        log::debug!("Video: stage {}", JobStage::AudioSynthesis);
        let audio = self.synthesizer.synthesize(&script).await?;
        log::debug!("Video: synthesized {} bytes", audio.data.len());

        // Stage 2: upload to durable storage. Fresh key per artifact so
        // concurrent jobs never collide.
        log::debug!("Video: stage {}", JobStage::Uploading);
        let key = format!("{}.mp3", chrono::Utc::now().timestamp_millis());
        let audio_url = match self
            .store
            .put(&key, audio.data.clone(), audio.format.mime_type())
            .await
        {
            Ok(url) => url,
            Err(e) => {
                log::error!("Video: audio upload failed: {}", e);
                // Hand the synthesized audio back inline; it is the artifact
                return Ok(VideoOutcome::failure(
                    FailureKind::AudioUploadFailed,
                    Some(audio.to_data_uri()),
                    e.to_string(),
                ));
            }
        };
        log::info!("Video: audio uploaded to {}", audio_url);

        // Stage 3: enqueue the avatar job
        log::debug!("Video: stage {}", JobStage::Queued);
        let request = SubmitRequest {
            image_url: image_url.to_string(),
            audio_url: audio_url.clone(),
            resolution: self.config.resolution.clone(),
        };
        let job = match self.queue.submit(&request).await {
            Ok(job) => job,
            Err(e) => {
                log::error!("Video: enqueue failed: {}", e);
                return Ok(VideoOutcome::failure(
                    FailureKind::EnqueueFailed,
                    Some(audio_url),
                    e.to_string(),
                ));
            }
        };
        log::info!("Video: queued as request {}", job.request_id);

        // Stage 4: poll to a terminal status, strictly sequentially
        log::debug!("Video: stage {}", JobStage::Polling);
        let mut completed = false;
        for attempt in 1..=self.config.max_poll_attempts {
            match self.queue.status(&job).await {
                Ok(status) if status == "COMPLETED" => {
                    log::info!("Video: completed after {} polls", attempt);
                    completed = true;
                    break;
                }
                Ok(status) if is_terminal(&status) => {
                    log::error!("Video: provider reported {} on poll {}", status, attempt);
                    return Ok(VideoOutcome::failure(
                        FailureKind::FalApiError,
                        Some(audio_url),
                        format!("Provider reported terminal status {}", status),
                    )
                    .with_status(status));
                }
                Ok(status) => {
                    log::debug!("Video: poll {} -> {}", attempt, status);
                }
                Err(e) => {
                    // A flaky status endpoint consumes the attempt budget
                    log::warn!("Video: status fetch failed on poll {}: {}", attempt, e);
                }
            }
            if attempt < self.config.max_poll_attempts {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        if !completed {
            log::error!(
                "Video: no terminal status within {} polls",
                self.config.max_poll_attempts
            );
            return Ok(VideoOutcome::failure(
                FailureKind::GenerationTimeout,
                Some(audio_url),
                format!(
                    "Generation did not finish within {} polls",
                    self.config.max_poll_attempts
                ),
            ));
        }

        // Stage 5: fetch the final payload and extract the video URL
        let payload = match self.queue.result(&job).await {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Video: result fetch failed: {}", e);
                return Ok(VideoOutcome::failure(
                    FailureKind::FalApiError,
                    Some(audio_url),
                    e.to_string(),
                ));
            }
        };

        match extract_video_url(&payload) {
            Some(video_url) => {
                log::info!("Video: done, {}", video_url);
                Ok(VideoOutcome::completed(video_url, audio_url))
            }
            None => {
                log::error!("Video: no video URL in payload: {}", payload);
                Ok(VideoOutcome::failure(
                    FailureKind::NoVideoUrlFound,
                    Some(audio_url),
                    payload.to_string(),
                ))
            }
        }
    }
}
