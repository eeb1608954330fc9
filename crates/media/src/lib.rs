//! Media plane of the voice bridge
//!
//! Everything between the telephony wire format and the agent backend:
//! mu-law transcoding, stateful resampling, inbound chunk accumulation,
//! the outbound jitter buffer, mark bookkeeping and the per-call duplex
//! session controller that ties them together.

pub mod bridge;
pub mod capture;
pub mod codec;
pub mod controller;
pub mod jitter;
pub mod marks;
pub mod resample;

pub use bridge::CodecBridge;
pub use capture::InboundCapture;
pub use controller::{ControllerOutcome, DuplexSessionController, SessionPhase};
pub use jitter::{JitterBuffer, OutboundFrame};
pub use marks::{MarkRecord, MarkTracker};
pub use resample::StreamResampler;

use thiserror::Error;

/// Media plane errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Malformed audio chunk: {0}")]
    MalformedAudio(String),

    #[error("Resampler error: {0}")]
    Resample(String),
}
