//! Inbound capture accumulator
//!
//! Caller audio arrives as 20ms frames but the agent backend prefers
//! larger appends. Decoded model-rate audio accumulates here until the
//! chunk target is reached, with an age ceiling so a trickle of short
//! frames cannot sit unheard.

use std::time::{Duration, Instant};

use voice_bridge_config::constants::audio::BYTES_PER_SAMPLE;
use voice_bridge_core::{AudioFrame, SampleRate};

/// Accumulates decoded PCM16 bytes between flushes to the agent session
pub struct InboundCapture {
    buffer: Vec<u8>,
    /// Flush once at least this many bytes have accumulated
    target_bytes: usize,
    /// Flush a non-empty buffer older than this regardless of size
    max_age: Duration,
    oldest: Option<Instant>,
}

impl InboundCapture {
    /// `chunk_ms` is the accumulation target, `max_age_ms` the ceiling;
    /// both are measured against the model-rate PCM16 byte stream.
    pub fn new(model_rate: SampleRate, chunk_ms: u64, max_age_ms: u64) -> Self {
        let target_bytes =
            model_rate.samples_per_frame(Duration::from_millis(chunk_ms)) * BYTES_PER_SAMPLE;
        Self {
            buffer: Vec::with_capacity(target_bytes * 2),
            target_bytes,
            max_age: Duration::from_millis(max_age_ms),
            oldest: None,
        }
    }

    /// Append a decoded model-rate frame; returns a chunk when the target
    /// is reached
    pub fn push(&mut self, frame: &AudioFrame) -> Option<Vec<u8>> {
        if frame.samples.is_empty() {
            return self.take_if_ready();
        }

        if self.buffer.is_empty() {
            self.oldest = Some(Instant::now());
        }
        self.buffer.extend_from_slice(&frame.to_pcm16());

        self.take_if_ready()
    }

    /// Age-based flush; called from the controller's periodic tick
    pub fn flush_if_stale(&mut self) -> Option<Vec<u8>> {
        match self.oldest {
            Some(oldest) if oldest.elapsed() >= self.max_age => self.take(),
            _ => None,
        }
    }

    /// Unconditional flush of whatever has accumulated
    pub fn drain(&mut self) -> Option<Vec<u8>> {
        self.take()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn take_if_ready(&mut self) -> Option<Vec<u8>> {
        if self.buffer.len() >= self.target_bytes {
            self.take()
        } else {
            None
        }
    }

    fn take(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }
        self.oldest = None;
        Some(std::mem::take(&mut self.buffer))
    }
}
