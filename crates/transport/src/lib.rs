//! Outward-facing transports
//!
//! Call control against the telephony provider's REST API, TwiML
//! generation for inbound calls, and the WebSocket client that turns the
//! agent backend into an [`AgentSession`](voice_bridge_core::AgentSession).

pub mod agent;
pub mod call_control;

pub use agent::{WsAgentConnector, WsAgentSession};
pub use call_control::{connect_stream_twiml, CallControl, CallStatusUpdate};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },
}
