//! Microphone capture and speaker playback adapters.
//!
//! Both sides run the cpal stream on a dedicated thread and talk to it over
//! a channel, so the async session code never holds a device handle across
//! an await point.

pub mod capture;
pub mod playback;

pub use capture::CpalCapture;
pub use playback::{CpalPlayback, PlaybackConfig};

use crate::error::Result;

/// A sealed, immutable recording. Produced once when the microphone is
/// released and consumed exactly once by transcription.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl AudioClip {
    pub fn wav(data: Vec<u8>) -> Self {
        Self {
            data,
            mime_type: "audio/wav".to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Microphone side of the adapter. The device is exclusively held between
/// `start` and `stop`/`abort` and released deterministically on both paths.
pub trait AudioInput: Send {
    /// Acquire the microphone and begin buffering audio.
    fn start(&mut self) -> Result<()>;

    /// Release the microphone and seal the buffered audio into a clip.
    fn stop(&mut self) -> Result<AudioClip>;

    /// Release the microphone and discard any buffered audio.
    fn abort(&mut self);
}

/// Speaker side of the adapter.
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Queue 16-bit PCM for playback and wait until it has fully drained.
    async fn play(&self, pcm: &[u8]) -> Result<()>;

    /// Stop playback and clear any buffered audio.
    async fn stop(&self) -> Result<()>;
}

/// Convert f32 samples to 16-bit little-endian PCM
pub fn samples_to_pcm(samples: &[f32]) -> Vec<u8> {
    let mut pcm_data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        pcm_data.extend_from_slice(&sample_i16.to_le_bytes());
    }
    pcm_data
}
