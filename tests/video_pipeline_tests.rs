//! End-to-end runs of the avatar video pipeline against scripted stand-ins
//! for synthesis, storage and the provider queue. The poll interval is set
//! to zero so the polling loop runs instantly.

use async_trait::async_trait;
use goal_coach_rs::config::VideoConfig;
use goal_coach_rs::error::{CoachError, Result};
use goal_coach_rs::tts::{AudioFormat, SpeechSynthesizer, SynthesizedAudio};
use goal_coach_rs::video::{
    FailureKind, ObjectStore, QueuedJob, SubmitRequest, VideoPipeline, VideoQueue,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Scripted stand-ins
// ---------------------------------------------------------------------------

struct RecordingSynthesizer {
    fail: bool,
    last_script_chars: AtomicUsize,
}

impl RecordingSynthesizer {
    fn new() -> Self {
        Self {
            fail: false,
            last_script_chars: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        if self.fail {
            return Err(CoachError::Tts("scripted failure".to_string()));
        }
        self.last_script_chars
            .store(text.chars().count(), Ordering::SeqCst);
        Ok(SynthesizedAudio {
            data: vec![0xAA; 128],
            format: AudioFormat::Mp3,
        })
    }
}

struct FakeStore {
    fail: bool,
    keys: Mutex<Vec<String>>,
}

impl FakeStore {
    fn new() -> Self {
        Self {
            fail: false,
            keys: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put(&self, key: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        if self.fail {
            return Err(CoachError::AudioUpload("bucket unavailable".to_string()));
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("https://cdn.test/{}", key))
    }
}

enum Poll {
    Status(&'static str),
    Unreachable,
}

struct ScriptedQueue {
    fail_submit: bool,
    fail_result: bool,
    polls: Mutex<VecDeque<Poll>>,
    polls_made: AtomicU32,
    result_payload: serde_json::Value,
    last_request: Mutex<Option<SubmitRequest>>,
}

impl ScriptedQueue {
    fn new(polls: Vec<Poll>, result_payload: serde_json::Value) -> Self {
        Self {
            fail_submit: false,
            fail_result: false,
            polls: Mutex::new(polls.into()),
            polls_made: AtomicU32::new(0),
            result_payload,
            last_request: Mutex::new(None),
        }
    }

    fn rejecting_submits() -> Self {
        Self {
            fail_submit: true,
            ..Self::new(vec![], json!({}))
        }
    }
}

#[async_trait]
impl VideoQueue for ScriptedQueue {
    async fn submit(&self, request: &SubmitRequest) -> Result<QueuedJob> {
        if self.fail_submit {
            return Err(CoachError::Enqueue("queue rejected job".to_string()));
        }
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(QueuedJob {
            request_id: "req-1".to_string(),
            status_url: "https://queue.test/req-1/status".to_string(),
            response_url: "https://queue.test/req-1".to_string(),
        })
    }

    async fn status(&self, _job: &QueuedJob) -> Result<String> {
        self.polls_made.fetch_add(1, Ordering::SeqCst);
        // Past the scripted sequence the job just stays in progress
        match self.polls.lock().unwrap().pop_front() {
            Some(Poll::Status(status)) => Ok(status.to_string()),
            Some(Poll::Unreachable) => {
                Err(CoachError::Connection("status endpoint down".to_string()))
            }
            None => Ok("IN_PROGRESS".to_string()),
        }
    }

    async fn result(&self, _job: &QueuedJob) -> Result<serde_json::Value> {
        if self.fail_result {
            return Err(CoachError::Connection("result endpoint down".to_string()));
        }
        Ok(self.result_payload.clone())
    }
}

fn test_config() -> VideoConfig {
    VideoConfig {
        script_max_chars: 600,
        poll_interval: Duration::ZERO,
        max_poll_attempts: 18,
        resolution: "480p".to_string(),
    }
}

fn pipeline(
    synthesizer: Arc<RecordingSynthesizer>,
    store: Arc<FakeStore>,
    queue: Arc<ScriptedQueue>,
) -> VideoPipeline<RecordingSynthesizer> {
    VideoPipeline::new(synthesizer, store, queue, test_config())
}

const IMAGE_URL: &str = "https://cdn.test/portrait.png";

// ---------------------------------------------------------------------------
// Terminal outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_completed_job_yields_video_and_audio_urls() {
    let store = Arc::new(FakeStore::new());
    let queue = Arc::new(ScriptedQueue::new(
        vec![Poll::Status("COMPLETED")],
        json!({ "video": { "url": "https://cdn.test/avatar.mp4" } }),
    ));
    let pipeline = pipeline(Arc::new(RecordingSynthesizer::new()), store.clone(), queue.clone());

    let outcome = pipeline.generate("Your plan, day by day", IMAGE_URL).await.unwrap();

    assert!(outcome.success);
    assert_eq!(
        outcome.video_url.as_deref(),
        Some("https://cdn.test/avatar.mp4")
    );
    let audio_url = outcome.audio_url.unwrap();
    assert!(audio_url.starts_with("https://cdn.test/"));
    assert!(audio_url.ends_with(".mp3"));
    assert_eq!(queue.polls_made.load(Ordering::SeqCst), 1);

    // The job was submitted with the hosted audio and the portrait
    let request = queue.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.image_url, IMAGE_URL);
    assert_eq!(request.audio_url, audio_url);
    assert_eq!(request.resolution, "480p");
}

#[tokio::test]
async fn test_provider_failure_reports_status_and_keeps_audio() {
    let queue = Arc::new(ScriptedQueue::new(
        vec![Poll::Status("IN_PROGRESS"), Poll::Status("FAILED")],
        json!({}),
    ));
    let pipeline = pipeline(
        Arc::new(RecordingSynthesizer::new()),
        Arc::new(FakeStore::new()),
        queue.clone(),
    );

    let outcome = pipeline.generate("some script", IMAGE_URL).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.error, Some(FailureKind::FalApiError));
    assert_eq!(outcome.status.as_deref(), Some("FAILED"));
    assert!(outcome.video_url.is_none());
    assert!(!outcome.audio_url.unwrap().is_empty());
    // Polling stopped at the terminal status
    assert_eq!(queue.polls_made.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timeout_after_exactly_the_attempt_budget() {
    let queue = Arc::new(ScriptedQueue::new(vec![], json!({})));
    let pipeline = pipeline(
        Arc::new(RecordingSynthesizer::new()),
        Arc::new(FakeStore::new()),
        queue.clone(),
    );

    let outcome = pipeline.generate("some script", IMAGE_URL).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.error, Some(FailureKind::GenerationTimeout));
    assert!(outcome.audio_url.is_some());
    assert_eq!(queue.polls_made.load(Ordering::SeqCst), 18);
}

#[tokio::test]
async fn test_flaky_status_endpoint_consumes_the_attempt_budget() {
    let polls = (0..18).map(|_| Poll::Unreachable).collect();
    let queue = Arc::new(ScriptedQueue::new(polls, json!({})));
    let pipeline = pipeline(
        Arc::new(RecordingSynthesizer::new()),
        Arc::new(FakeStore::new()),
        queue.clone(),
    );

    let outcome = pipeline.generate("some script", IMAGE_URL).await.unwrap();

    assert_eq!(outcome.error, Some(FailureKind::GenerationTimeout));
    assert_eq!(queue.polls_made.load(Ordering::SeqCst), 18);
}

#[tokio::test]
async fn test_missing_video_url_in_result_payload() {
    let queue = Arc::new(ScriptedQueue::new(
        vec![Poll::Status("COMPLETED")],
        json!({ "frames": 1200 }),
    ));
    let pipeline = pipeline(
        Arc::new(RecordingSynthesizer::new()),
        Arc::new(FakeStore::new()),
        queue,
    );

    let outcome = pipeline.generate("some script", IMAGE_URL).await.unwrap();

    assert_eq!(outcome.error, Some(FailureKind::NoVideoUrlFound));
    assert!(outcome.audio_url.is_some());
    // The unrecognized payload is surfaced for debugging
    assert!(outcome.message.unwrap().contains("frames"));
}

#[tokio::test]
async fn test_result_fetch_failure_downgrades_to_provider_error() {
    let mut queue = ScriptedQueue::new(vec![Poll::Status("COMPLETED")], json!({}));
    queue.fail_result = true;
    let pipeline = pipeline(
        Arc::new(RecordingSynthesizer::new()),
        Arc::new(FakeStore::new()),
        Arc::new(queue),
    );

    let outcome = pipeline.generate("some script", IMAGE_URL).await.unwrap();

    assert_eq!(outcome.error, Some(FailureKind::FalApiError));
    assert!(outcome.audio_url.is_some());
}

// ---------------------------------------------------------------------------
// Early-stage failure shapes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_synthesis_failure_is_a_hard_error() {
    let pipeline = pipeline(
        Arc::new(RecordingSynthesizer::failing()),
        Arc::new(FakeStore::new()),
        Arc::new(ScriptedQueue::new(vec![], json!({}))),
    );

    let err = pipeline.generate("some script", IMAGE_URL).await.unwrap_err();
    assert!(matches!(err, CoachError::Tts(_)));
}

#[tokio::test]
async fn test_upload_failure_hands_back_inline_audio() {
    let pipeline = pipeline(
        Arc::new(RecordingSynthesizer::new()),
        Arc::new(FakeStore::failing()),
        Arc::new(ScriptedQueue::new(vec![], json!({}))),
    );

    let outcome = pipeline.generate("some script", IMAGE_URL).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.error, Some(FailureKind::AudioUploadFailed));
    // No hosted URL exists, so the synthesized audio rides along inline
    let audio_url = outcome.audio_url.unwrap();
    assert!(audio_url.starts_with("data:audio/mpeg;base64,"));
    assert!(audio_url.len() > "data:audio/mpeg;base64,".len());
}

#[tokio::test]
async fn test_enqueue_failure_keeps_hosted_audio_url() {
    let pipeline = pipeline(
        Arc::new(RecordingSynthesizer::new()),
        Arc::new(FakeStore::new()),
        Arc::new(ScriptedQueue::rejecting_submits()),
    );

    let outcome = pipeline.generate("some script", IMAGE_URL).await.unwrap();

    assert_eq!(outcome.error, Some(FailureKind::EnqueueFailed));
    assert!(outcome.audio_url.unwrap().starts_with("https://cdn.test/"));
}

// ---------------------------------------------------------------------------
// Script handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_script_truncated_before_synthesis() {
    let synthesizer = Arc::new(RecordingSynthesizer::new());
    let queue = Arc::new(ScriptedQueue::new(
        vec![Poll::Status("COMPLETED")],
        json!({ "url": "https://cdn.test/avatar.mp4" }),
    ));
    let pipeline = pipeline(synthesizer.clone(), Arc::new(FakeStore::new()), queue);

    let long_script = "a".repeat(700);
    pipeline.generate(&long_script, IMAGE_URL).await.unwrap();
    assert_eq!(synthesizer.last_script_chars.load(Ordering::SeqCst), 600);

    let short_script = "b".repeat(42);
    pipeline.generate(&short_script, IMAGE_URL).await.unwrap();
    assert_eq!(synthesizer.last_script_chars.load(Ordering::SeqCst), 42);
}

#[tokio::test]
async fn test_upload_keys_are_unique_per_job() {
    let store = Arc::new(FakeStore::new());
    let queue = Arc::new(ScriptedQueue::new(
        vec![Poll::Status("COMPLETED"), Poll::Status("COMPLETED")],
        json!({ "url": "https://cdn.test/avatar.mp4" }),
    ));
    let pipeline = pipeline(Arc::new(RecordingSynthesizer::new()), store.clone(), queue);

    pipeline.generate("first", IMAGE_URL).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    pipeline.generate("second", IMAGE_URL).await.unwrap();

    let keys = store.keys.lock().unwrap();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
    assert!(keys.iter().all(|k| k.ends_with(".mp3")));
}
