use crate::error::{CoachError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub struct PlaybackConfig {
    /// Sample rate of the PCM handed to `play` (OpenAI TTS emits 24 kHz)
    pub input_sample_rate: u32,
    /// Buffer size in milliseconds
    pub buffer_size_ms: u32,
    /// How often to check the buffer while waiting for a clip to drain
    pub drain_poll_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 24000,
            buffer_size_ms: 60000,
            drain_poll_interval: Duration::from_millis(50),
        }
    }
}

enum PlaybackCommand {
    Queue(Vec<u8>),
    Clear,
    Shutdown,
}

/// Speaker playback over cpal. Mono 16-bit PCM is queued to an audio thread
/// that resamples to the device rate with linear interpolation.
pub struct CpalPlayback {
    command_tx: Sender<PlaybackCommand>,
    buffered_samples: Arc<AtomicUsize>,
    is_stopped: Arc<AtomicBool>,
    config: PlaybackConfig,
    audio_thread: Option<thread::JoinHandle<()>>,
}

impl CpalPlayback {
    pub fn new(config: PlaybackConfig) -> Result<Self> {
        let (command_tx, command_rx) = channel();
        let buffered_samples = Arc::new(AtomicUsize::new(0));
        let buffered_clone = Arc::clone(&buffered_samples);
        let is_stopped = Arc::new(AtomicBool::new(false));

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            CoachError::Audio("No output device found".to_string())
        })?;
        log::debug!("Playback: using output device {:?}", device.name());

        let supported_config = device
            .default_output_config()
            .map_err(|e| CoachError::Audio(format!("Failed to query output config: {}", e)))?;

        let output_sample_rate = supported_config.sample_rate().0;
        let output_channels = supported_config.channels() as usize;
        let input_sample_rate = config.input_sample_rate;

        let samples_queue = Arc::new(Mutex::new(Vec::<f32>::new()));
        let samples_queue_clone = Arc::clone(&samples_queue);

        let audio_thread = thread::spawn(move || {
            let stream = match device.build_output_stream(
                &supported_config.config(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = samples_queue_clone.lock().unwrap();

                    let output_frames = data.len() / output_channels;
                    let step = input_sample_rate as f32 / output_sample_rate as f32;
                    let input_needed =
                        (output_frames as f32 * step).ceil() as usize;

                    let mut src_idx: f32 = 0.0;
                    for frame in data.chunks_mut(output_channels) {
                        let sample = if !queue.is_empty() {
                            let lo = src_idx.floor() as usize;
                            let hi = lo + 1;
                            let frac = src_idx.fract();
                            let s1 = queue.get(lo).copied().unwrap_or(0.0);
                            let s2 = queue.get(hi).copied().unwrap_or(0.0);
                            s1 * (1.0 - frac) + s2 * frac
                        } else {
                            0.0
                        };

                        for channel in frame.iter_mut() {
                            *channel = sample;
                        }
                        src_idx += step;
                    }

                    if input_needed <= queue.len() {
                        queue.drain(0..input_needed);
                    } else {
                        queue.clear();
                    }

                    buffered_clone.store(queue.len(), Ordering::Release);
                },
                move |err| {
                    log::error!("Playback stream error: {}", err);
                },
                None,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    log::error!("Playback: failed to create output stream: {}", e);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                log::error!("Playback: failed to start output stream: {}", e);
                return;
            }

            while let Ok(command) = command_rx.recv() {
                match command {
                    PlaybackCommand::Queue(pcm) => {
                        let mut queue = samples_queue.lock().unwrap();
                        for chunk in pcm.chunks_exact(2) {
                            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                            queue.push(sample as f32 / i16::MAX as f32);
                        }
                        log::debug!("Playback: queued, {} samples buffered", queue.len());
                    }
                    PlaybackCommand::Clear => {
                        samples_queue.lock().unwrap().clear();
                    }
                    PlaybackCommand::Shutdown => break,
                }
            }

            log::debug!("Playback: audio thread exiting");
        });

        Ok(Self {
            command_tx,
            buffered_samples,
            is_stopped,
            config,
            audio_thread: Some(audio_thread),
        })
    }
}

#[async_trait::async_trait]
impl super::AudioOutput for CpalPlayback {
    async fn play(&self, pcm: &[u8]) -> Result<()> {
        if self.is_stopped.load(Ordering::Acquire) {
            return Err(CoachError::Audio("Playback is stopped".to_string()));
        }

        let max_samples = (self.config.buffer_size_ms as usize
            * self.config.input_sample_rate as usize)
            / 1000;
        if pcm.len() / 2 > max_samples {
            return Err(CoachError::Audio("Clip exceeds playback buffer".to_string()));
        }

        self.command_tx
            .send(PlaybackCommand::Queue(pcm.to_vec()))
            .map_err(|e| CoachError::Audio(format!("Failed to queue audio: {}", e)))?;

        // Suspend until the clip has drained, so the next turn cannot
        // start over the top of the assistant's voice
        loop {
            tokio::time::sleep(self.config.drain_poll_interval).await;
            if self.is_stopped.load(Ordering::Acquire) {
                return Ok(()); // stopped mid-clip, nothing left to wait for
            }
            if self.buffered_samples.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        self.is_stopped.store(true, Ordering::Release);
        self.command_tx
            .send(PlaybackCommand::Clear)
            .map_err(|e| CoachError::Audio(format!("Failed to stop playback: {}", e)))?;
        Ok(())
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        let _ = self.command_tx.send(PlaybackCommand::Shutdown);
        if let Some(thread) = self.audio_thread.take() {
            if let Err(e) = thread.join() {
                log::error!("Failed to join playback thread: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioOutput;

    #[tokio::test]
    async fn test_playback_creation() {
        match CpalPlayback::new(PlaybackConfig::default()) {
            Ok(playback) => {
                assert!(!playback.is_stopped.load(Ordering::Acquire));
            }
            Err(e) => {
                log::warn!("Audio device not available in test environment: {}", e);
            }
        }
    }

    #[tokio::test]
    async fn test_stop_rejects_further_play() {
        let Ok(playback) = CpalPlayback::new(PlaybackConfig::default()) else {
            return; // no device in CI
        };
        playback.stop().await.unwrap();
        let silence = vec![0u8; 480];
        assert!(playback.play(&silence).await.is_err());
    }
}
