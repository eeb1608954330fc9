//! Outbound jitter buffer and playback gate
//!
//! Bounded FIFO of encoded 20ms frames between the agent's bursty audio
//! production and the paced 20ms drain toward the provider. Overflow drops
//! the oldest frame so a stalled consumer loses the most latent audio
//! first. In device mode the drain is gated until a pre-roll depth has
//! accumulated; relay deployments leave the gate open because the provider
//! buffers on its side.

use std::collections::VecDeque;

use tracing::{debug, warn};
use voice_bridge_config::SchedulerMode;

use crate::marks::MarkRecord;

/// One encoded outbound frame, carrying the playback range it covers
///
/// The mark id for this frame is allocated only when it is actually
/// transmitted; a frame evicted by overflow therefore never enters the
/// mark tracker's books.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Base64 mu-law payload, exactly one 20ms frame
    pub payload: String,
    /// Item and byte range this frame plays back
    pub mark: MarkRecord,
}

/// Bounded frame queue with drop-oldest backpressure
pub struct JitterBuffer {
    frames: VecDeque<OutboundFrame>,
    capacity: usize,
    mode: SchedulerMode,
    preroll_frames: usize,
    /// Device mode only: false until pre-roll depth is reached
    gate_open: bool,
    dropped: u64,
}

impl JitterBuffer {
    pub fn new(capacity: usize, mode: SchedulerMode, preroll_frames: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            mode,
            preroll_frames,
            gate_open: mode == SchedulerMode::Relay,
            dropped: 0,
        }
    }

    /// Enqueue a frame, evicting exactly the oldest one on overflow
    pub fn push(&mut self, frame: OutboundFrame) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            self.dropped += 1;
            if self.dropped % 50 == 1 {
                warn!(dropped = self.dropped, "Jitter buffer overflow, oldest frame dropped");
            }
        }
        self.frames.push_back(frame);

        if !self.gate_open && self.frames.len() >= self.preroll_frames {
            debug!(depth = self.frames.len(), "Pre-roll reached, opening playback gate");
            self.gate_open = true;
        }
    }

    /// Dequeue the next frame if the playback gate allows it
    pub fn pop_frame(&mut self) -> Option<OutboundFrame> {
        if !self.gate_open {
            return None;
        }
        self.frames.pop_front()
    }

    /// Discard all queued frames and re-arm the pre-roll gate
    ///
    /// Called on interruption; the frames removed here were never sent, so
    /// they need no mark accounting.
    pub fn clear(&mut self) {
        let discarded = self.frames.len();
        self.frames.clear();
        if self.mode == SchedulerMode::Device {
            self.gate_open = false;
        }
        if discarded > 0 {
            debug!(discarded, "Jitter buffer cleared");
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames evicted by overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: &str) -> OutboundFrame {
        OutboundFrame {
            payload: tag.to_string(),
            mark: MarkRecord {
                item_id: "item".to_string(),
                content_offset: 0,
                len: 960,
            },
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut buf = JitterBuffer::new(8, SchedulerMode::Relay, 0);
        buf.push(frame("a"));
        buf.push(frame("b"));
        assert_eq!(buf.pop_frame().unwrap().payload, "a");
        assert_eq!(buf.pop_frame().unwrap().payload, "b");
        assert!(buf.pop_frame().is_none());
    }

    #[test]
    fn test_overflow_drops_exactly_oldest() {
        let mut buf = JitterBuffer::new(3, SchedulerMode::Relay, 0);
        for tag in ["a", "b", "c", "d"] {
            buf.push(frame(tag));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.dropped(), 1);
        assert_eq!(buf.pop_frame().unwrap().payload, "b");
    }

    #[test]
    fn test_device_mode_gates_until_preroll() {
        let mut buf = JitterBuffer::new(16, SchedulerMode::Device, 3);
        buf.push(frame("a"));
        buf.push(frame("b"));
        assert!(buf.pop_frame().is_none());

        buf.push(frame("c"));
        assert_eq!(buf.pop_frame().unwrap().payload, "a");
        // Gate stays open even as the queue drains below pre-roll
        assert_eq!(buf.pop_frame().unwrap().payload, "b");
        assert_eq!(buf.pop_frame().unwrap().payload, "c");
    }

    #[test]
    fn test_clear_rearms_device_gate() {
        let mut buf = JitterBuffer::new(16, SchedulerMode::Device, 2);
        buf.push(frame("a"));
        buf.push(frame("b"));
        assert!(buf.pop_frame().is_some());

        buf.clear();
        assert!(buf.is_empty());
        buf.push(frame("c"));
        assert!(buf.pop_frame().is_none(), "gate must re-arm after clear");
        buf.push(frame("d"));
        assert!(buf.pop_frame().is_some());
    }

    #[test]
    fn test_relay_mode_never_gates() {
        let mut buf = JitterBuffer::new(16, SchedulerMode::Relay, 8);
        buf.push(frame("a"));
        assert!(buf.pop_frame().is_some());
        buf.clear();
        buf.push(frame("b"));
        assert!(buf.pop_frame().is_some());
    }
}
