use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info, warn};

/// Whisper expects 16 kHz mono input.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Level-meter callback, fed one normalized value per audio chunk.
pub type LevelCallback = Box<dyn Fn(f32) + Send + 'static>;

struct RecordingSession {
    // Held only to keep the stream alive; dropping it stops capture.
    _stream: cpal::Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    channels: u16,
}

/// Microphone recorder with one ephemeral session at a time.
///
/// The input stream is created on start and torn down on stop or cancel, so
/// the microphone indicator only shows while a dictation is active.
pub struct AudioRecorder {
    session: Option<RecordingSession>,
}

impl AudioRecorder {
    #[must_use]
    pub const fn new() -> Self {
        Self { session: None }
    }

    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Open the default input device and start capturing.
    ///
    /// `on_level` receives a normalized loudness value per chunk for UI
    /// metering. Starting while a session is active restarts it.
    ///
    /// # Errors
    /// Returns an error if no input device is available or the stream
    /// cannot be built; a denied microphone permission surfaces here.
    pub fn start(&mut self, on_level: LevelCallback) -> Result<()> {
        if self.session.is_some() {
            warn!("recording already active, restarting session");
            self.session = None;
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("no input device available")?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());

        let supported_config = device
            .default_input_config()
            .context("failed to get default input config")?;
        let sample_rate = supported_config.sample_rate();
        let channels = supported_config.channels();

        info!(
            device = %device_name,
            sample_rate,
            channels,
            "starting audio capture"
        );

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let capture_buffer = Arc::clone(&buffer);

        let stream = device
            .build_input_stream(
                &supported_config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut samples) = capture_buffer.lock() {
                        samples.extend_from_slice(data);
                    }
                    on_level(chunk_level(data));
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .context("failed to build input stream")?;

        stream.play().context("failed to start audio stream")?;

        self.session = Some(RecordingSession {
            _stream: stream,
            buffer,
            sample_rate,
            channels,
        });
        Ok(())
    }

    /// Stop capturing and return the session's samples as 16 kHz mono.
    ///
    /// Returns `None` when no recording is active.
    pub fn stop(&mut self) -> Option<Vec<f32>> {
        let session = self.session.take()?;

        let samples = session
            .buffer
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default();

        info!(
            raw_samples = samples.len(),
            sample_rate = session.sample_rate,
            channels = session.channels,
            "recording stopped"
        );

        let mono = downmix_to_mono(&samples, session.channels);
        Some(resample_linear(
            &mono,
            session.sample_rate,
            TARGET_SAMPLE_RATE,
        ))
    }

    /// Discard the active session without returning samples.
    pub fn cancel(&mut self) {
        if self.session.take().is_some() {
            debug!("recording cancelled, samples discarded");
        }
    }
}

impl Default for AudioRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalized loudness of one chunk for the level meter.
///
/// RMS scaled so that half of full scale maps to 1.0, which makes typical
/// speech fill most of the meter range.
#[must_use]
pub fn chunk_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    #[allow(clippy::cast_precision_loss)]
    let rms = (sum_sq / samples.len() as f64).sqrt();
    #[allow(clippy::cast_possible_truncation)]
    {
        ((rms * 2.0) as f32).min(1.0)
    }
}

/// Average interleaved frames down to a single channel.
#[must_use]
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resample from `from_rate` to `to_rate`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = ((samples.len() as f64) / ratio).ceil() as usize;

    let mut out = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src = (i as f64) * ratio;
        let lo = src.floor() as usize;
        let hi = (lo + 1).min(samples.len() - 1);
        let fract = src - src.floor();

        let sample = if lo < samples.len() {
            let s1 = f64::from(samples[lo]);
            let s2 = f64::from(samples[hi]);
            s1.mul_add(1.0 - fract, s2 * fract) as f32
        } else {
            0.0
        };
        out.push(sample);
    }
    out
}

/// Encode 16 kHz mono samples as an in-memory 16-bit PCM WAV.
///
/// # Errors
/// Returns an error if WAV encoding fails, which with an in-memory cursor
/// only happens on malformed state.
pub fn wav_bytes(samples: &[f32]) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, spec).context("failed to create WAV writer")?;
        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer.write_sample(value).context("failed to write sample")?;
        }
        writer.finalize().context("failed to finalize WAV data")?;
    }
    Ok(cursor.into_inner())
}
