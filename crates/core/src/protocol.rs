//! Telephony media-stream wire protocol
//!
//! JSON envelopes exchanged with the provider over the media-stream
//! WebSocket. Inbound and outbound messages are closed enums matched
//! exhaustively, so an unhandled event kind is a compile-time hole rather
//! than a silent fall-through.

use serde::{Deserialize, Serialize};

/// Message received from the provider on the media-stream socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// First message after the WebSocket is established
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    /// Stream metadata; binds the provider-assigned stream id
    Start {
        start: StartMeta,
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    /// One 20ms frame of base64 mu-law caller audio
    Media {
        media: MediaPayload,
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    /// Echo of a previously sent mark, signalling playback completion
    Mark {
        mark: MarkName,
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    /// Keypad digit pressed by the caller
    Dtmf { dtmf: DtmfPayload },
    /// Stream has ended; the call is over
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
}

/// Metadata carried by the `start` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "accountSid", default)]
    pub account_sid: Option<String>,
    #[serde(rename = "mediaFormat", default)]
    pub media_format: Option<MediaFormat>,
}

/// Declared audio format of the stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFormat {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(rename = "sampleRate", default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u8>,
}

/// Base64 audio payload of a `media` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Mark correlation token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkName {
    pub name: String,
}

/// DTMF digit payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtmfPayload {
    pub digit: String,
    #[serde(default)]
    pub track: Option<String>,
}

/// Message sent to the provider on the media-stream socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamCommand {
    /// One frame of base64 mu-law synthesized audio
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    /// Correlation token the provider echoes back once the preceding
    /// audio has been physically played
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkName,
    },
    /// Discard any audio the provider has buffered but not yet played
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl StreamCommand {
    /// Build a `media` command from an already-encoded base64 payload
    pub fn media(stream_sid: impl Into<String>, payload_b64: impl Into<String>) -> Self {
        StreamCommand::Media {
            stream_sid: stream_sid.into(),
            media: MediaPayload {
                payload: payload_b64.into(),
                track: None,
                timestamp: None,
            },
        }
    }

    /// Build a `mark` command
    pub fn mark(stream_sid: impl Into<String>, name: impl Into<String>) -> Self {
        StreamCommand::Mark {
            stream_sid: stream_sid.into(),
            mark: MarkName { name: name.into() },
        }
    }
}
