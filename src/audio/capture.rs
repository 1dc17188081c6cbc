use super::AudioClip;
use crate::error::{CoachError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const TARGET_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Optional device name; default input device when unset
    pub device_name: Option<String>,
    /// How long to wait for the device to come up before failing
    pub open_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            open_timeout: Duration::from_secs(3),
        }
    }
}

struct ActiveCapture {
    stop_tx: Sender<()>,
    thread: thread::JoinHandle<()>,
    buffer: Arc<Mutex<Vec<i16>>>,
}

/// Microphone capture over cpal. The stream lives on a dedicated thread;
/// samples are downmixed to mono, resampled to 16 kHz and buffered as i16
/// until the capture is sealed.
pub struct CpalCapture {
    config: CaptureConfig,
    active: Option<ActiveCapture>,
}

impl CpalCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    fn spawn_capture_thread(
        &self,
    ) -> Result<(Sender<()>, Receiver<std::result::Result<(), String>>, Arc<Mutex<Vec<i16>>>, thread::JoinHandle<()>)>
    {
        let (stop_tx, stop_rx) = channel::<()>();
        let (ready_tx, ready_rx) = channel::<std::result::Result<(), String>>();
        let buffer = Arc::new(Mutex::new(Vec::<i16>::new()));
        let buffer_clone = Arc::clone(&buffer);
        let device_name = self.config.device_name.clone();

        let thread = thread::spawn(move || {
            let host = cpal::default_host();

            let device = match device_name {
                Some(ref name) => host
                    .input_devices()
                    .ok()
                    .and_then(|mut devs| devs.find(|d| d.name().unwrap_or_default() == *name)),
                None => host.default_input_device(),
            };

            let device = match device {
                Some(dev) => dev,
                None => {
                    let _ = ready_tx.send(Err("No input device available".to_string()));
                    return;
                }
            };

            let supported = match device.default_input_config() {
                Ok(cfg) => cfg,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("Failed to query input config: {}", e)));
                    return;
                }
            };

            log::debug!("Capture: using input config {:?}", supported);

            let sample_format = supported.sample_format();
            let stream_config = supported.config();
            let channels = stream_config.channels as usize;
            let ratio = stream_config.sample_rate.0 as f32 / TARGET_SAMPLE_RATE as f32;

            let build = |fmt: SampleFormat| match fmt {
                SampleFormat::I16 => {
                    build_stream::<i16>(&device, &stream_config, buffer_clone.clone(), channels, ratio)
                }
                SampleFormat::F32 => {
                    build_stream::<f32>(&device, &stream_config, buffer_clone.clone(), channels, ratio)
                }
                other => Err(format!("Unsupported sample format: {:?}", other)),
            };

            let stream = match build(sample_format) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("Failed to start input stream: {}", e)));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            log::debug!("Capture: recording started");

            // Park until told to stop; the stream is dropped on exit
            let _ = stop_rx.recv();
            log::debug!("Capture: recording stopped");
        });

        Ok((stop_tx, ready_rx, buffer, thread))
    }
}

impl super::AudioInput for CpalCapture {
    fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(CoachError::Session("Recording already in progress".to_string()));
        }

        let (stop_tx, ready_rx, buffer, thread) = self.spawn_capture_thread()?;

        match ready_rx.recv_timeout(self.config.open_timeout) {
            Ok(Ok(())) => {
                self.active = Some(ActiveCapture {
                    stop_tx,
                    thread,
                    buffer,
                });
                Ok(())
            }
            Ok(Err(msg)) => {
                let _ = thread.join();
                Err(CoachError::MicrophoneAccess(msg))
            }
            Err(_) => {
                let _ = stop_tx.send(());
                let _ = thread.join();
                Err(CoachError::MicrophoneAccess(
                    "Timed out waiting for input device".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) -> Result<AudioClip> {
        let active = self
            .active
            .take()
            .ok_or_else(|| CoachError::Session("No recording in progress".to_string()))?;

        let _ = active.stop_tx.send(());
        if active.thread.join().is_err() {
            return Err(CoachError::Audio("Capture thread panicked".to_string()));
        }

        let samples = {
            let mut buffer = active.buffer.lock().unwrap();
            std::mem::take(&mut *buffer)
        };

        log::info!(
            "Capture: sealed {} samples ({:.1}s)",
            samples.len(),
            samples.len() as f32 / TARGET_SAMPLE_RATE as f32
        );

        seal_wav(&samples)
    }

    fn abort(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.stop_tx.send(());
            let _ = active.thread.join();
            log::debug!("Capture: aborted, buffered audio discarded");
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        use super::AudioInput;
        self.abort();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Arc<Mutex<Vec<i16>>>,
    channels: usize,
    ratio: f32,
) -> std::result::Result<cpal::Stream, String>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Take channel 0 only and convert to f32
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .filter_map(|frame| frame.first())
                    .map(|&s| f32::from_sample(s))
                    .collect();

                // Linear-interpolation resample down to 16 kHz
                let out_len = (mono.len() as f32 / ratio) as usize;
                let mut buffer = buffer.lock().unwrap();
                buffer.reserve(out_len);
                for i in 0..out_len {
                    let src = i as f32 * ratio;
                    let lo = src.floor() as usize;
                    let hi = (lo + 1).min(mono.len().saturating_sub(1));
                    let frac = src - lo as f32;
                    let sample = mono[lo] * (1.0 - frac) + mono[hi] * frac;
                    buffer.push((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                }
            },
            |err| log::error!("Capture stream error: {}", err),
            None,
        )
        .map_err(|e| format!("Failed to build input stream: {}", e))
}

/// Seal 16 kHz mono PCM samples into an in-memory WAV container
fn seal_wav(samples: &[i16]) -> Result<AudioClip> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CoachError::Audio(format!("Failed to create WAV writer: {}", e)))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| CoachError::Audio(format!("Failed to write sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| CoachError::Audio(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(AudioClip::wav(cursor.into_inner()))
}
