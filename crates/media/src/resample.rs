//! Stateful streaming resampler
//!
//! Wraps a fixed-input-size polynomial resampler and carries its filter
//! state across calls, so chunk boundaries do not introduce discontinuities.
//! Input that does not fill a whole processing chunk is held back and
//! prepended to the next call; the resampler never pads.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;
use voice_bridge_core::SampleRate;

use crate::MediaError;

/// One direction of continuous sample-rate conversion
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    chunk_size: usize,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a resampler for a fixed rate pair
    ///
    /// Equal rates degenerate to a passthrough with no held-back samples.
    pub fn new(from: SampleRate, to: SampleRate) -> Result<Self, MediaError> {
        // One 20ms frame of input per processing chunk
        let chunk_size = from.frame_size_20ms();

        let inner = if from == to {
            None
        } else {
            let ratio = to.as_u32() as f64 / from.as_u32() as f64;
            let resampler =
                FastFixedIn::new(ratio, 1.0, PolynomialDegree::Septic, chunk_size, 1)
                    .map_err(|e| MediaError::Resample(e.to_string()))?;
            Some(resampler)
        };

        debug!(
            from = from.as_u32(),
            to = to.as_u32(),
            chunk_size,
            "Stream resampler created"
        );

        Ok(Self {
            inner,
            chunk_size,
            pending: Vec::new(),
        })
    }

    /// Samples currently held back waiting for a full processing chunk
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed input samples; returns all output produced by the complete
    /// chunks they filled. May return an empty vec.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, MediaError> {
        let Some(resampler) = self.inner.as_mut() else {
            // Passthrough still forwards the (empty) pending buffer shape
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            let mut processed = resampler
                .process(&[chunk], None)
                .map_err(|e| MediaError::Resample(e.to_string()))?;
            output.append(&mut processed.remove(0));
        }

        Ok(output)
    }

    /// Drop held-back samples and filter history; used when the stream is
    /// discontinuous anyway (interruption, session end).
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.inner.as_mut() {
            resampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsample_ratio() {
        let mut rs = StreamResampler::new(SampleRate::Hz8000, SampleRate::Hz24000).unwrap();
        let input = vec![0.1f32; 1600]; // 200ms at 8kHz
        let output = rs.process(&input).unwrap();
        // 3x ratio, full chunks only
        assert_eq!(output.len(), 4800);
        assert_eq!(rs.pending_len(), 0);
    }

    #[test]
    fn test_partial_chunk_held_back() {
        let mut rs = StreamResampler::new(SampleRate::Hz8000, SampleRate::Hz24000).unwrap();
        // 100 samples < one 160-sample chunk
        let output = rs.process(&vec![0.1f32; 100]).unwrap();
        assert!(output.is_empty());
        assert_eq!(rs.pending_len(), 100);

        // 60 more completes the chunk
        let output = rs.process(&vec![0.1f32; 60]).unwrap();
        assert_eq!(output.len(), 480);
        assert_eq!(rs.pending_len(), 0);
    }

    #[test]
    fn test_downsample_ratio() {
        let mut rs = StreamResampler::new(SampleRate::Hz24000, SampleRate::Hz8000).unwrap();
        let input = vec![0.1f32; 960]; // two 480-sample chunks
        let output = rs.process(&input).unwrap();
        assert_eq!(output.len(), 320);
    }

    #[test]
    fn test_passthrough_when_rates_equal() {
        let mut rs = StreamResampler::new(SampleRate::Hz8000, SampleRate::Hz8000).unwrap();
        let input = vec![0.25f32; 123];
        let output = rs.process(&input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut rs = StreamResampler::new(SampleRate::Hz8000, SampleRate::Hz24000).unwrap();
        rs.process(&vec![0.1f32; 100]).unwrap();
        assert_eq!(rs.pending_len(), 100);
        rs.reset();
        assert_eq!(rs.pending_len(), 0);
    }
}
