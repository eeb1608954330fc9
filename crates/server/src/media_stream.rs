//! Media-stream WebSocket endpoint
//!
//! The provider dials in after TwiML told it to. The socket goes through a
//! short handshake (`connected`, then `start`), then a controller owns the
//! session: this task keeps reading the socket and forwarding parsed
//! events, a writer task drains the controller's command channel and sends
//! keepalive pings, and the controller loop does everything else.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use voice_bridge_core::{PeakThresholdDetector, StreamCommand, StreamEvent};
use voice_bridge_media::DuplexSessionController;

use crate::state::AppState;
use crate::ServerError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET /media-stream`
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = run_media_stream(socket, state).await {
            warn!(error = %e, "Media stream ended with error");
        }
    })
}

async fn run_media_stream(socket: WebSocket, state: AppState) -> Result<(), ServerError> {
    let (sink, mut stream) = socket.split();

    let start = tokio::time::timeout(HANDSHAKE_TIMEOUT, await_start(&mut stream))
        .await
        .map_err(|_| ServerError::Handshake("timed out waiting for start event".into()))??;

    let stream_sid = start.stream_sid.clone();
    info!(
        stream_sid = %stream_sid,
        call_sid = ?start.call_sid,
        "Media stream started"
    );

    let session = state
        .connector
        .connect()
        .await
        .map_err(|e| ServerError::Session(e.to_string()))?;

    let bridge_config = state.config.read().bridge.clone();
    let keepalive_secs = bridge_config.keepalive_secs;
    let detector = Box::new(PeakThresholdDetector::new(bridge_config.barge_in_peak));

    let (command_tx, command_rx) = mpsc::channel::<StreamCommand>(256);
    let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(64);

    let controller = DuplexSessionController::new(
        stream_sid.clone(),
        &bridge_config,
        session,
        detector,
        event_rx,
        command_tx,
    )
    .map_err(|e| ServerError::Internal(e.to_string()))?;

    // Guard-based removal so a panicking controller cannot leak the entry
    let _session_guard = state.registry.register(stream_sid.clone(), start.call_sid);

    let writer = tokio::spawn(write_commands(sink, command_rx, keepalive_secs));
    let controller_handle = tokio::spawn(controller.run());

    // Reader loop: forward parsed events until the socket or the
    // controller goes away
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<StreamEvent>(&text) {
                Ok(event) => {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(stream_sid = %stream_sid, error = %e, "Unparseable stream event"),
            },
            Ok(Message::Close(_)) => {
                debug!(stream_sid = %stream_sid, "Provider closed the socket");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Binary(_)) => {}
            Err(e) => {
                warn!(stream_sid = %stream_sid, error = %e, "Socket read error");
                break;
            }
        }
    }
    drop(event_tx);

    let outcome = controller_handle.await;
    let _ = writer.await;

    let outcome = outcome.map_err(|e| ServerError::Internal(e.to_string()))?;
    info!(stream_sid = %stream_sid, ?outcome, "Media stream closed");
    Ok(())
}

/// Consume handshake events until `start` arrives
async fn await_start(
    stream: &mut SplitStream<WebSocket>,
) -> Result<voice_bridge_core::StartMeta, ServerError> {
    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| ServerError::WebSocket(e.to_string()))?;
        let Message::Text(text) = message else {
            continue;
        };

        match serde_json::from_str::<StreamEvent>(&text) {
            Ok(StreamEvent::Connected { protocol, .. }) => {
                debug!(protocol = ?protocol, "Stream connected");
            }
            Ok(StreamEvent::Start { start, .. }) => return Ok(start),
            Ok(other) => {
                warn!(event = ?other, "Unexpected event before start");
            }
            Err(e) => {
                return Err(ServerError::Handshake(format!(
                    "unparseable handshake event: {e}"
                )));
            }
        }
    }
    Err(ServerError::Handshake(
        "socket closed before start event".into(),
    ))
}

/// Writer task: drain outbound commands and ping the socket periodically
async fn write_commands(
    mut sink: SplitSink<WebSocket, Message>,
    mut commands: mpsc::Receiver<StreamCommand>,
    keepalive_secs: u64,
) {
    let mut keepalive = tokio::time::interval(Duration::from_secs(keepalive_secs.max(1)));
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    keepalive.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    let text = match serde_json::to_string(&command) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Dropping unserializable command");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = keepalive.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}
