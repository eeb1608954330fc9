//! Agent-session collaborator interface
//!
//! The conversational backend is consumed as an opaque bidirectional
//! event+audio session. The bridge sends caller audio in, receives an
//! ordered event sequence out, and reports playback positions back so the
//! backend's turn-taking knows exactly how much of a cancelled utterance
//! the caller actually heard.

use async_trait::async_trait;

use crate::audio::AudioFrame;
use crate::CoreError;

/// Event emitted by the agent session
///
/// The agent backend serializes utterance start/end events, so at most one
/// utterance is in flight at a time; the bridge trusts that ordering.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// An utterance is about to start streaming
    UtteranceStart,
    /// A chunk of synthesized audio (PCM16 LE at the model rate)
    Audio {
        /// Utterance/item this chunk belongs to
        item_id: String,
        /// Byte offset of this chunk within the utterance
        content_offset: usize,
        /// Raw PCM16 payload
        data: Vec<u8>,
    },
    /// The current utterance finished streaming
    UtteranceEnd,
    /// The backend interrupted its own response (server-side barge-in)
    Interrupted,
    /// A tool invocation started
    ToolStart { name: String },
    /// A tool invocation finished
    ToolEnd { name: String },
    /// Conversation was handed off to another agent
    Handoff { to: String },
    /// Conversation history changed
    HistoryUpdated,
    /// Backend-internal error; does not by itself end the session
    Error { message: String },
}

/// One live conversation with the agent backend
#[async_trait]
pub trait AgentSession: Send {
    /// Forward caller audio (PCM16 LE at the model rate)
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), CoreError>;

    /// Ask the backend to cancel its in-flight response
    async fn cancel_response(&mut self) -> Result<(), CoreError>;

    /// Report a played byte range of an utterance back to the backend
    async fn report_playback(
        &mut self,
        item_id: &str,
        offset: usize,
        len: usize,
    ) -> Result<(), CoreError>;

    /// Next event from the backend; `None` once the session is closed
    async fn next_event(&mut self) -> Option<AgentEvent>;

    /// Close the session. Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), CoreError>;
}

/// Factory producing agent sessions, one per call
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn AgentSession>, CoreError>;
}

/// Decides whether a decoded caller frame should interrupt agent playback
///
/// The default implementation is a peak-amplitude threshold; swapping in a
/// real voice-activity detector only requires a new implementation of this
/// trait, not changes to the session state machine.
pub trait BargeInDetector: Send + Sync {
    fn should_interrupt(&self, frame: &AudioFrame) -> bool;
}

/// Peak-amplitude barge-in detector
///
/// Fires when a frame's peak exceeds the threshold, which distinguishes
/// genuine caller speech from line noise well enough for telephony audio.
#[derive(Debug, Clone)]
pub struct PeakThresholdDetector {
    threshold: f32,
}

impl PeakThresholdDetector {
    /// Create a detector with a normalized peak threshold (0.0 - 1.0)
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl BargeInDetector for PeakThresholdDetector {
    fn should_interrupt(&self, frame: &AudioFrame) -> bool {
        frame.peak > self.threshold
    }
}
