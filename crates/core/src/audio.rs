//! Audio frame types and utilities

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Supported audio sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - Telephony
    #[default]
    Hz8000,
    /// 16kHz - Standard speech recognition
    Hz16000,
    /// 24kHz - Realtime model audio
    Hz24000,
}

impl SampleRate {
    /// Get sample rate as u32
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz24000 => 24000,
        }
    }

    /// Samples in a frame of the given duration
    pub fn samples_per_frame(&self, frame: Duration) -> usize {
        (self.as_u32() as u128 * frame.as_millis() / 1000) as usize
    }

    /// Get frame size for 20ms chunk (the provider frame cadence)
    pub fn frame_size_20ms(&self) -> usize {
        (self.as_u32() as usize * 20) / 1000
    }
}

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Channels {
    #[default]
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(&self) -> usize {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

/// Audio frame with metadata
///
/// Internally stores samples as f32 normalized to [-1.0, 1.0]. Frames are
/// produced by decode/resample steps and consumed after one hop; they are
/// never retained across the bridge.
#[derive(Clone)]
pub struct AudioFrame {
    /// Raw audio samples (f32, normalized to [-1.0, 1.0])
    pub samples: Arc<[f32]>,
    /// Sample rate
    pub sample_rate: SampleRate,
    /// Number of channels
    pub channels: Channels,
    /// Duration of this frame
    pub duration: Duration,
    /// Peak absolute amplitude (0.0 - 1.0)
    pub peak: f32,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples_len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration", &self.duration)
            .field("peak", &self.peak)
            .finish()
    }
}

impl AudioFrame {
    /// Create a new audio frame from f32 samples
    pub fn new(samples: Vec<f32>, sample_rate: SampleRate, channels: Channels) -> Self {
        let duration = Duration::from_secs_f64(
            samples.len() as f64 / (sample_rate.as_u32() as f64 * channels.count() as f64),
        );
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));

        Self {
            samples: samples.into(),
            sample_rate,
            channels,
            duration,
            peak,
        }
    }

    /// Convert from PCM16 bytes (little-endian)
    ///
    /// Returns `None` for odd-length input; the caller decides whether to
    /// drop the chunk (the bridge treats it as a transient decode error).
    pub fn from_pcm16(bytes: &[u8], sample_rate: SampleRate, channels: Channels) -> Option<Self> {
        if bytes.len() % 2 != 0 {
            return None;
        }

        const PCM16_NORMALIZE: f32 = 32768.0;

        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                sample as f32 / PCM16_NORMALIZE
            })
            .collect();

        Some(Self::new(samples, sample_rate, channels))
    }

    /// Convert to PCM16 bytes (little-endian)
    pub fn to_pcm16(&self) -> Vec<u8> {
        const PCM16_SCALE: f32 = 32767.0;

        self.samples
            .iter()
            .flat_map(|&sample| {
                let clamped = sample.clamp(-1.0, 1.0);
                let pcm16 = (clamped * PCM16_SCALE) as i16;
                pcm16.to_le_bytes()
            })
            .collect()
    }

    /// RMS energy in decibels
    pub fn energy_db(&self) -> f32 {
        if self.samples.is_empty() {
            return -96.0;
        }

        let sum_squares: f32 = self.samples.iter().map(|s| s * s).sum();
        let rms = (sum_squares / self.samples.len() as f32).sqrt();

        if rms > 0.0 {
            20.0 * rms.log10()
        } else {
            -96.0
        }
    }
}
