//! Core types for the voice bridge
//!
//! This crate provides the foundational types shared by all other crates:
//!
//! - Audio frame types and sample-rate enums (`audio`)
//! - The telephony provider's media-stream wire protocol (`protocol`)
//! - The agent-session collaborator interface (`agent`)
//!
//! It deliberately contains no I/O; transports and codecs live in the
//! `transport` and `media` crates.

pub mod agent;
pub mod audio;
pub mod protocol;

pub use agent::{
    AgentConnector, AgentEvent, AgentSession, BargeInDetector, PeakThresholdDetector,
};
pub use audio::{AudioFrame, Channels, SampleRate};
pub use protocol::{
    DtmfPayload, MarkName, MediaFormat, MediaPayload, StartMeta, StreamCommand, StreamEvent,
};

use thiserror::Error;

/// Core errors shared across the bridge
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed or inconsistent audio payload (odd length, wrong encoding)
    #[error("Malformed audio: {0}")]
    MalformedAudio(String),

    /// Wire-protocol envelope could not be parsed or produced
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Agent-session collaborator failure
    #[error("Agent session error: {0}")]
    Agent(String),

    /// The session has already been closed
    #[error("Session closed")]
    SessionClosed,
}
