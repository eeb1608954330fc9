//! Mark bookkeeping for playback tracking
//!
//! Each outbound audio frame is followed by a `mark` command; when the
//! provider echoes the mark back, the audio before it has been physically
//! played. The tracker maps mark sequence numbers to utterance positions
//! so playback progress can be reported to the agent backend.

use std::collections::HashMap;

use tracing::trace;

/// Playback position a mark stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkRecord {
    /// Utterance/item the audio belongs to
    pub item_id: String,
    /// Byte offset of the frame within the utterance (model-rate PCM16)
    pub content_offset: usize,
    /// Byte length of the frame
    pub len: usize,
}

/// Monotonic mark id allocator and outstanding-mark table
#[derive(Debug, Default)]
pub struct MarkTracker {
    next_seq: u64,
    outstanding: HashMap<u64, MarkRecord>,
}

impl MarkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next mark id for a frame about to be sent
    ///
    /// Ids are monotonic over the life of the stream, never reused, even
    /// across interruptions.
    pub fn issue(&mut self, record: MarkRecord) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.outstanding.insert(seq, record);
        seq
    }

    /// Acknowledge an echoed mark, at most once
    ///
    /// Unknown or repeated names return `None`; a provider echoing a mark
    /// twice must not double-report playback.
    pub fn ack(&mut self, name: &str) -> Option<MarkRecord> {
        let seq: u64 = name.parse().ok()?;
        let record = self.outstanding.remove(&seq);
        if record.is_none() {
            trace!(name, "Ignoring unknown or already-acked mark");
        }
        record
    }

    /// Forget all outstanding marks without acknowledging them
    ///
    /// Used on interruption: the provider discarded the corresponding
    /// audio, so their echoes will never arrive (and if a stray one does,
    /// [`ack`](Self::ack) treats it as unknown).
    pub fn clear(&mut self) {
        self.outstanding.clear();
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}
