//! WebSocket client for the agent backend
//!
//! Implements the `AgentSession`/`AgentConnector` traits over a JSON
//! envelope: audio travels base64-encoded inside text frames in both
//! directions. Unknown event types from the backend are logged and
//! skipped so a backend upgrade does not kill live calls.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use voice_bridge_core::{AgentConnector, AgentEvent, AgentSession, CoreError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Message sent to the backend
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage<'a> {
    /// Caller audio append (PCM16 LE at the model rate, base64)
    InputAudio { audio: String },
    /// Cancel the in-flight response
    Cancel,
    /// Playback progress report for a played byte range
    PlaybackProgress {
        item_id: &'a str,
        offset: usize,
        len: usize,
    },
}

/// Message received from the backend
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BackendMessage {
    UtteranceStart,
    Audio {
        item_id: String,
        #[serde(default)]
        content_offset: usize,
        audio: String,
    },
    UtteranceEnd,
    Interrupted,
    ToolStart { name: String },
    ToolEnd { name: String },
    Handoff { to: String },
    HistoryUpdated,
    Error { message: String },
}

/// Connector that dials the backend once per call
pub struct WsAgentConnector {
    endpoint: String,
    api_key: Option<String>,
}

impl WsAgentConnector {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self { endpoint, api_key }
    }
}

#[async_trait]
impl AgentConnector for WsAgentConnector {
    async fn connect(&self) -> Result<Box<dyn AgentSession>, CoreError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| CoreError::Agent(format!("invalid endpoint: {e}")))?;

        if let Some(key) = &self.api_key {
            let value = format!("Bearer {key}")
                .parse()
                .map_err(|_| CoreError::Agent("api key is not a valid header value".into()))?;
            request.headers_mut().insert("authorization", value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| CoreError::Agent(format!("backend connect failed: {e}")))?;
        info!(endpoint = %self.endpoint, "Agent backend connected");

        let (write, read) = stream.split();
        Ok(Box::new(WsAgentSession {
            write,
            read,
            closed: false,
        }))
    }
}

/// One live backend conversation over a WebSocket
pub struct WsAgentSession {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    closed: bool,
}

impl WsAgentSession {
    async fn send_json(&mut self, message: &ClientMessage<'_>) -> Result<(), CoreError> {
        if self.closed {
            return Err(CoreError::SessionClosed);
        }
        let text = serde_json::to_string(message)
            .map_err(|e| CoreError::Protocol(e.to_string()))?;
        self.write
            .send(Message::Text(text))
            .await
            .map_err(|e| CoreError::Agent(e.to_string()))
    }
}

#[async_trait]
impl AgentSession for WsAgentSession {
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), CoreError> {
        self.send_json(&ClientMessage::InputAudio {
            audio: BASE64.encode(pcm),
        })
        .await
    }

    async fn cancel_response(&mut self) -> Result<(), CoreError> {
        self.send_json(&ClientMessage::Cancel).await
    }

    async fn report_playback(
        &mut self,
        item_id: &str,
        offset: usize,
        len: usize,
    ) -> Result<(), CoreError> {
        self.send_json(&ClientMessage::PlaybackProgress {
            item_id,
            offset,
            len,
        })
        .await
    }

    async fn next_event(&mut self) -> Option<AgentEvent> {
        loop {
            let message = self.read.next().await?;
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<BackendMessage>(&text) {
                    Ok(parsed) => match backend_to_event(parsed) {
                        Ok(event) => return Some(event),
                        Err(e) => warn!(error = %e, "Dropping backend event with bad audio"),
                    },
                    Err(e) => warn!(error = %e, "Skipping unrecognized backend message"),
                },
                Ok(Message::Close(_)) => {
                    debug!("Agent backend closed the connection");
                    return None;
                }
                // tungstenite answers pings during polling
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Binary(_)) | Ok(Message::Frame(_)) => {
                    warn!("Ignoring non-text frame from agent backend");
                }
                Err(e) => {
                    warn!(error = %e, "Agent backend read error");
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), CoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Best effort; the peer may already be gone
        let _ = self.write.send(Message::Close(None)).await;
        Ok(())
    }
}

fn backend_to_event(message: BackendMessage) -> Result<AgentEvent, CoreError> {
    Ok(match message {
        BackendMessage::UtteranceStart => AgentEvent::UtteranceStart,
        BackendMessage::Audio {
            item_id,
            content_offset,
            audio,
        } => AgentEvent::Audio {
            item_id,
            content_offset,
            data: BASE64
                .decode(audio.as_bytes())
                .map_err(|e| CoreError::MalformedAudio(e.to_string()))?,
        },
        BackendMessage::UtteranceEnd => AgentEvent::UtteranceEnd,
        BackendMessage::Interrupted => AgentEvent::Interrupted,
        BackendMessage::ToolStart { name } => AgentEvent::ToolStart { name },
        BackendMessage::ToolEnd { name } => AgentEvent::ToolEnd { name },
        BackendMessage::Handoff { to } => AgentEvent::Handoff { to },
        BackendMessage::HistoryUpdated => AgentEvent::HistoryUpdated,
        BackendMessage::Error { message } => AgentEvent::Error { message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_serialize() {
        let json = serde_json::to_string(&ClientMessage::InputAudio {
            audio: "AAAA".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"input_audio""#));

        let json = serde_json::to_string(&ClientMessage::PlaybackProgress {
            item_id: "item-1",
            offset: 960,
            len: 960,
        })
        .unwrap();
        assert!(json.contains(r#""type":"playback_progress""#));
        assert!(json.contains(r#""offset":960"#));
    }

    #[test]
    fn test_backend_audio_parses_and_decodes() {
        let json = r#"{"type":"audio","item_id":"item-1","content_offset":0,"audio":"AAAA"}"#;
        let message: BackendMessage = serde_json::from_str(json).unwrap();
        let event = backend_to_event(message).unwrap();
        match event {
            AgentEvent::Audio { item_id, data, .. } => {
                assert_eq!(item_id, "item-1");
                assert_eq!(data.len(), 3);
            }
            other => panic!("expected audio, got {:?}", other),
        }
    }

    #[test]
    fn test_backend_bad_base64_is_malformed() {
        let message = BackendMessage::Audio {
            item_id: "item-1".to_string(),
            content_offset: 0,
            audio: "not base64!!!".to_string(),
        };
        assert!(matches!(
            backend_to_event(message),
            Err(CoreError::MalformedAudio(_))
        ));
    }

    #[test]
    fn test_unknown_backend_type_is_a_parse_error() {
        let json = r#"{"type":"telemetry","payload":{}}"#;
        assert!(serde_json::from_str::<BackendMessage>(json).is_err());
    }
}
