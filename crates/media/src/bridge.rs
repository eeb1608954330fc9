//! Codec bridge between the telephony wire format and the model format
//!
//! Inbound: base-rate mu-law frames become PCM f32 at the model rate.
//! Outbound: model-rate PCM16 chunks become whole 20ms mu-law frames.
//! Each direction owns its resampler state; partial output frames are held
//! back until the next chunk completes them. No frame is ever padded.

use tracing::trace;
use voice_bridge_core::{AudioFrame, Channels, SampleRate};
use voice_bridge_config::constants::audio::FRAME_BYTES_MULAW;

use crate::codec;
use crate::resample::StreamResampler;
use crate::MediaError;

const PCM16_NORMALIZE: f32 = 32768.0;
const PCM16_SCALE: f32 = 32767.0;

/// Stateful per-call transcoder
pub struct CodecBridge {
    inbound: StreamResampler,
    outbound: StreamResampler,
    /// Outbound mu-law bytes not yet forming a whole frame
    partial: Vec<u8>,
    model_rate: SampleRate,
}

impl CodecBridge {
    pub fn new(model_rate: SampleRate) -> Result<Self, MediaError> {
        Ok(Self {
            inbound: StreamResampler::new(SampleRate::Hz8000, model_rate)?,
            outbound: StreamResampler::new(model_rate, SampleRate::Hz8000)?,
            partial: Vec::new(),
            model_rate,
        })
    }

    pub fn model_rate(&self) -> SampleRate {
        self.model_rate
    }

    /// Decode one inbound mu-law chunk to model-rate f32 samples
    ///
    /// May return fewer samples than the nominal ratio implies when the
    /// resampler holds some back; the remainder surfaces on later calls.
    pub fn decode_inbound(&mut self, mulaw: &[u8]) -> Result<Vec<f32>, MediaError> {
        if mulaw.is_empty() {
            return Ok(Vec::new());
        }

        let linear = codec::decode_mulaw(mulaw);
        let samples: Vec<f32> = linear.iter().map(|&s| s as f32 / PCM16_NORMALIZE).collect();
        let resampled = self.inbound.process(&samples)?;

        trace!(
            in_bytes = mulaw.len(),
            out_samples = resampled.len(),
            "Inbound chunk decoded"
        );
        Ok(resampled)
    }

    /// Encode one outbound model-rate PCM16 chunk to whole mu-law frames
    ///
    /// Returns zero or more complete 160-byte frames. A trailing partial
    /// frame is carried into the next call. Odd-length input is rejected
    /// without touching any held state, so one bad chunk costs only itself.
    pub fn encode_outbound(&mut self, pcm16: &[u8]) -> Result<Vec<Vec<u8>>, MediaError> {
        let frame = AudioFrame::from_pcm16(pcm16, self.model_rate, Channels::Mono).ok_or_else(
            || {
                MediaError::MalformedAudio(format!(
                    "odd-length PCM16 chunk ({} bytes)",
                    pcm16.len()
                ))
            },
        )?;

        let resampled = self.outbound.process(&frame.samples)?;

        self.partial.reserve(resampled.len());
        for sample in resampled {
            let clamped = sample.clamp(-1.0, 1.0);
            self.partial
                .push(codec::linear_to_mulaw((clamped * PCM16_SCALE) as i16));
        }

        let mut frames = Vec::with_capacity(self.partial.len() / FRAME_BYTES_MULAW);
        while self.partial.len() >= FRAME_BYTES_MULAW {
            frames.push(self.partial.drain(..FRAME_BYTES_MULAW).collect());
        }

        trace!(
            in_bytes = pcm16.len(),
            frames = frames.len(),
            held = self.partial.len(),
            "Outbound chunk encoded"
        );
        Ok(frames)
    }

    /// Drop held-back outbound samples; the tail of an interrupted
    /// utterance must not leak into the next one.
    pub fn reset_outbound(&mut self) {
        self.partial.clear();
        self.outbound.reset();
    }

    /// Outbound mu-law bytes currently awaiting a full frame
    pub fn held_bytes(&self) -> usize {
        self.partial.len()
    }
}
