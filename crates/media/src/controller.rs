//! Duplex session controller
//!
//! One controller per call, running a single cooperative loop that
//! multiplexes provider stream events, agent session events and the 20ms
//! pacing tick. All state mutation happens between awaits of that one
//! task, so every transition is atomic with respect to the session.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use voice_bridge_config::constants::audio::FRAME_MS;
use voice_bridge_config::{BridgeConfig, GatingMode};
use voice_bridge_core::{
    AgentEvent, AgentSession, AudioFrame, BargeInDetector, Channels, SampleRate, StreamCommand,
    StreamEvent,
};

use crate::bridge::CodecBridge;
use crate::capture::InboundCapture;
use crate::jitter::{JitterBuffer, OutboundFrame};
use crate::marks::{MarkRecord, MarkTracker};
use crate::MediaError;

/// Lifecycle phase of a session
///
/// `Idle` and `Connecting` cover construction and the provider handshake
/// (driven by the server before the loop starts); the loop itself moves
/// between the two active states and finally through `Closing` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Listening,
    AgentSpeaking,
    Closing,
    Closed,
}

/// Why the controller loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerOutcome {
    /// Provider sent `stop`; the call ended normally
    ProviderStopped,
    /// Provider socket closed without a `stop` event
    ProviderDisconnected,
    /// Agent session ended its event stream
    AgentEnded,
    /// Outbound command channel closed underneath us
    TransportClosed,
}

/// Per-call bridge state machine
pub struct DuplexSessionController {
    stream_sid: String,
    phase: SessionPhase,
    bridge: CodecBridge,
    capture: InboundCapture,
    jitter: JitterBuffer,
    marks: MarkTracker,
    session: Box<dyn AgentSession>,
    detector: Box<dyn BargeInDetector>,
    events: mpsc::Receiver<StreamEvent>,
    commands: mpsc::Sender<StreamCommand>,
    model_rate: SampleRate,
    gating: GatingMode,
    /// Bytes of one outbound frame measured in model-rate PCM16
    frame_model_bytes: usize,
    /// Utterance currently being framed for playback
    current_item: Option<String>,
    /// Model-rate byte offset of the next frame within the current item
    item_offset: usize,
    /// Utterance finished streaming; waiting for the queue to drain
    draining: bool,
    closed: bool,
    barge_ins: u64,
}

enum Branch {
    Stream(Option<StreamEvent>),
    Agent(Option<AgentEvent>),
    Tick,
}

impl DuplexSessionController {
    pub fn new(
        stream_sid: String,
        config: &BridgeConfig,
        session: Box<dyn AgentSession>,
        detector: Box<dyn BargeInDetector>,
        events: mpsc::Receiver<StreamEvent>,
        commands: mpsc::Sender<StreamCommand>,
    ) -> Result<Self, MediaError> {
        let model_rate = sample_rate_from_hz(config.model_rate)?;
        let frame_model_bytes = model_rate.frame_size_20ms() * 2;

        Ok(Self {
            stream_sid,
            phase: SessionPhase::Idle,
            bridge: CodecBridge::new(model_rate)?,
            capture: InboundCapture::new(model_rate, config.chunk_ms, config.max_flush_age_ms),
            jitter: JitterBuffer::new(
                config.jitter_capacity,
                config.scheduler_mode,
                config.preroll_frames,
            ),
            marks: MarkTracker::new(),
            session,
            detector,
            events,
            commands,
            model_rate,
            gating: config.gating,
            frame_model_bytes,
            current_item: None,
            item_offset: 0,
            draining: false,
            closed: false,
            barge_ins: 0,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Run the session to completion
    pub async fn run(mut self) -> ControllerOutcome {
        self.phase = SessionPhase::Listening;
        info!(stream_sid = %self.stream_sid, "Session active");

        let mut pace = tokio::time::interval(Duration::from_millis(FRAME_MS));
        pace.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let outcome = loop {
            let branch = tokio::select! {
                event = self.events.recv() => Branch::Stream(event),
                event = self.session.next_event() => Branch::Agent(event),
                _ = pace.tick() => Branch::Tick,
            };

            let exit = match branch {
                Branch::Stream(Some(event)) => self.on_stream_event(event).await,
                Branch::Stream(None) => Some(ControllerOutcome::ProviderDisconnected),
                Branch::Agent(Some(event)) => self.on_agent_event(event).await,
                Branch::Agent(None) => Some(ControllerOutcome::AgentEnded),
                Branch::Tick => self.on_tick().await,
            };

            if let Some(outcome) = exit {
                break outcome;
            }
        };

        self.shutdown().await;
        info!(
            stream_sid = %self.stream_sid,
            ?outcome,
            barge_ins = self.barge_ins,
            dropped_frames = self.jitter.dropped(),
            "Session ended"
        );
        outcome
    }

    async fn on_stream_event(&mut self, event: StreamEvent) -> Option<ControllerOutcome> {
        match event {
            StreamEvent::Connected { .. } | StreamEvent::Start { .. } => {
                // Handshake events are consumed before the loop starts;
                // a repeat is harmless
                debug!(stream_sid = %self.stream_sid, "Ignoring duplicate handshake event");
                None
            }
            StreamEvent::Media { media, .. } => self.on_caller_media(&media.payload).await,
            StreamEvent::Mark { mark, .. } => {
                if let Some(record) = self.marks.ack(&mark.name) {
                    if let Err(e) = self
                        .session
                        .report_playback(&record.item_id, record.content_offset, record.len)
                        .await
                    {
                        warn!(stream_sid = %self.stream_sid, error = %e, "Playback report failed");
                    }
                }
                None
            }
            StreamEvent::Dtmf { dtmf } => {
                info!(stream_sid = %self.stream_sid, digit = %dtmf.digit, "DTMF received");
                None
            }
            StreamEvent::Stop { .. } => {
                info!(stream_sid = %self.stream_sid, "Provider stopped the stream");
                Some(ControllerOutcome::ProviderStopped)
            }
        }
    }

    async fn on_caller_media(&mut self, payload_b64: &str) -> Option<ControllerOutcome> {
        let mulaw = match BASE64.decode(payload_b64) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(stream_sid = %self.stream_sid, error = %e, "Dropping undecodable media frame");
                return None;
            }
        };

        let samples = match self.bridge.decode_inbound(&mulaw) {
            Ok(samples) => samples,
            Err(e) => {
                warn!(stream_sid = %self.stream_sid, error = %e, "Dropping malformed media frame");
                return None;
            }
        };
        counter!("bridge_frames_in_total").increment(1);

        let frame = AudioFrame::new(samples, self.model_rate, Channels::Mono);

        if self.phase == SessionPhase::AgentSpeaking && self.detector.should_interrupt(&frame) {
            debug!(
                stream_sid = %self.stream_sid,
                peak = frame.peak,
                energy_db = frame.energy_db(),
                "Caller speech during playback"
            );
            self.interrupt(true).await;
        }

        // Half-duplex: caller audio is muted while the agent holds the floor
        if self.phase == SessionPhase::AgentSpeaking && self.gating == GatingMode::HalfDuplex {
            return None;
        }

        if let Some(chunk) = self.capture.push(&frame) {
            if let Err(e) = self.session.send_audio(&chunk).await {
                warn!(stream_sid = %self.stream_sid, error = %e, "Failed to forward caller audio");
            }
        }
        None
    }

    async fn on_agent_event(&mut self, event: AgentEvent) -> Option<ControllerOutcome> {
        match event {
            AgentEvent::UtteranceStart => {
                debug!(stream_sid = %self.stream_sid, "Agent utterance started");
                self.phase = SessionPhase::AgentSpeaking;
                self.draining = false;
            }
            AgentEvent::Audio { item_id, data, .. } => {
                self.phase = SessionPhase::AgentSpeaking;
                self.on_agent_audio(item_id, &data);
            }
            AgentEvent::UtteranceEnd => {
                debug!(stream_sid = %self.stream_sid, "Agent utterance complete, draining queue");
                self.draining = true;
            }
            AgentEvent::Interrupted => {
                // Backend already cancelled its response; mirror the local
                // interruption without sending a redundant cancel
                self.interrupt(false).await;
            }
            AgentEvent::ToolStart { name } => {
                debug!(stream_sid = %self.stream_sid, tool = %name, "Agent tool started");
            }
            AgentEvent::ToolEnd { name } => {
                debug!(stream_sid = %self.stream_sid, tool = %name, "Agent tool finished");
            }
            AgentEvent::Handoff { to } => {
                info!(stream_sid = %self.stream_sid, to = %to, "Conversation handed off");
            }
            AgentEvent::HistoryUpdated => {}
            AgentEvent::Error { message } => {
                warn!(stream_sid = %self.stream_sid, error = %message, "Agent reported an error");
            }
        }
        None
    }

    fn on_agent_audio(&mut self, item_id: String, pcm16: &[u8]) {
        if self.current_item.as_deref() != Some(&item_id) {
            self.current_item = Some(item_id.clone());
            self.item_offset = 0;
        }

        let frames = match self.bridge.encode_outbound(pcm16) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(stream_sid = %self.stream_sid, error = %e, "Dropping malformed agent audio chunk");
                return;
            }
        };

        // Mark ids are allocated at transmit time in on_tick, so frames
        // the jitter buffer evicts never count as outstanding playback
        for frame in frames {
            let record = MarkRecord {
                item_id: item_id.clone(),
                content_offset: self.item_offset,
                len: self.frame_model_bytes,
            };
            self.item_offset += self.frame_model_bytes;

            self.jitter.push(OutboundFrame {
                payload: BASE64.encode(&frame),
                mark: record,
            });
        }
    }

    async fn on_tick(&mut self) -> Option<ControllerOutcome> {
        if let Some(chunk) = self.capture.flush_if_stale() {
            if let Err(e) = self.session.send_audio(&chunk).await {
                warn!(stream_sid = %self.stream_sid, error = %e, "Failed to forward stale capture");
            }
        }

        if let Some(frame) = self.jitter.pop_frame() {
            let media = StreamCommand::media(self.stream_sid.clone(), frame.payload);
            if self.commands.send(media).await.is_err() {
                return Some(ControllerOutcome::TransportClosed);
            }
            counter!("bridge_frames_out_total").increment(1);

            let seq = self.marks.issue(frame.mark);
            let mark = StreamCommand::mark(self.stream_sid.clone(), seq.to_string());
            if self.commands.send(mark).await.is_err() {
                return Some(ControllerOutcome::TransportClosed);
            }
        } else if self.draining
            && self.phase == SessionPhase::AgentSpeaking
            && self.marks.outstanding() == 0
        {
            debug!(stream_sid = %self.stream_sid, "Playback drained, back to listening");
            self.phase = SessionPhase::Listening;
            self.draining = false;
        }

        None
    }

    /// Interrupt agent playback; idempotent
    ///
    /// `cancel_backend` is false when the interruption originated from the
    /// backend itself, in which case it has already stopped producing.
    async fn interrupt(&mut self, cancel_backend: bool) {
        if self.phase != SessionPhase::AgentSpeaking && self.jitter.is_empty() {
            return;
        }

        info!(stream_sid = %self.stream_sid, local = cancel_backend, "Interrupting agent playback");
        self.barge_ins += 1;
        counter!("bridge_barge_ins_total").increment(1);

        if cancel_backend {
            if let Err(e) = self.session.cancel_response().await {
                warn!(stream_sid = %self.stream_sid, error = %e, "Cancel request failed");
            }
        }

        self.jitter.clear();
        self.bridge.reset_outbound();
        self.marks.clear();
        self.current_item = None;
        self.item_offset = 0;
        self.draining = false;

        let clear = StreamCommand::Clear {
            stream_sid: self.stream_sid.clone(),
        };
        if self.commands.send(clear).await.is_err() {
            warn!(stream_sid = %self.stream_sid, "Transport closed during interruption");
        }

        self.phase = SessionPhase::Listening;
    }

    /// Close the agent session exactly once; every exit path funnels here
    async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.phase = SessionPhase::Closing;

        // Forward any audio still buffered so trailing caller speech is
        // not lost on normal hangups
        if let Some(chunk) = self.capture.drain() {
            let _ = self.session.send_audio(&chunk).await;
        }

        if let Err(e) = self.session.close().await {
            warn!(stream_sid = %self.stream_sid, error = %e, "Agent session close failed");
        }
        self.phase = SessionPhase::Closed;
    }
}

fn sample_rate_from_hz(hz: u32) -> Result<SampleRate, MediaError> {
    match hz {
        8000 => Ok(SampleRate::Hz8000),
        16000 => Ok(SampleRate::Hz16000),
        24000 => Ok(SampleRate::Hz24000),
        other => Err(MediaError::MalformedAudio(format!(
            "unsupported model rate {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use voice_bridge_core::{CoreError, MediaPayload, PeakThresholdDetector};

    #[derive(Debug, Clone, PartialEq)]
    enum MockCall {
        SendAudio(usize),
        Cancel,
        Report(String, usize, usize),
        Close,
    }

    struct MockAgentSession {
        calls: Arc<Mutex<Vec<MockCall>>>,
        events: mpsc::UnboundedReceiver<AgentEvent>,
    }

    #[async_trait]
    impl AgentSession for MockAgentSession {
        async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), CoreError> {
            self.calls.lock().push(MockCall::SendAudio(pcm.len()));
            Ok(())
        }

        async fn cancel_response(&mut self) -> Result<(), CoreError> {
            self.calls.lock().push(MockCall::Cancel);
            Ok(())
        }

        async fn report_playback(
            &mut self,
            item_id: &str,
            offset: usize,
            len: usize,
        ) -> Result<(), CoreError> {
            self.calls
                .lock()
                .push(MockCall::Report(item_id.to_string(), offset, len));
            Ok(())
        }

        async fn next_event(&mut self) -> Option<AgentEvent> {
            self.events.recv().await
        }

        async fn close(&mut self) -> Result<(), CoreError> {
            self.calls.lock().push(MockCall::Close);
            Ok(())
        }
    }

    struct Harness {
        calls: Arc<Mutex<Vec<MockCall>>>,
        agent_tx: mpsc::UnboundedSender<AgentEvent>,
        stream_tx: mpsc::Sender<StreamEvent>,
        command_rx: mpsc::Receiver<StreamCommand>,
        handle: tokio::task::JoinHandle<ControllerOutcome>,
    }

    fn spawn_controller(config: BridgeConfig) -> Harness {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (agent_tx, agent_rx) = mpsc::unbounded_channel();
        let (stream_tx, stream_rx) = mpsc::channel(64);
        let (command_tx, command_rx) = mpsc::channel(256);

        let session = Box::new(MockAgentSession {
            calls: calls.clone(),
            events: agent_rx,
        });
        let detector = Box::new(PeakThresholdDetector::new(config.barge_in_peak));

        let controller = DuplexSessionController::new(
            "MZtest".to_string(),
            &config,
            session,
            detector,
            stream_rx,
            command_tx,
        )
        .unwrap();

        Harness {
            calls,
            agent_tx,
            stream_tx,
            command_rx,
            handle: tokio::spawn(controller.run()),
        }
    }

    fn media_event(mulaw: &[u8]) -> StreamEvent {
        StreamEvent::Media {
            media: MediaPayload {
                payload: BASE64.encode(mulaw),
                track: Some("inbound".to_string()),
                timestamp: None,
            },
            stream_sid: Some("MZtest".to_string()),
        }
    }

    // 20ms of near-silence / loud speech in mu-law
    fn quiet_frame() -> Vec<u8> {
        vec![codec_silence(); 160]
    }

    fn loud_frame() -> Vec<u8> {
        vec![crate::codec::linear_to_mulaw(16000); 160]
    }

    fn codec_silence() -> u8 {
        crate::codec::linear_to_mulaw(0)
    }

    async fn drain_commands(rx: &mut mpsc::Receiver<StreamCommand>) -> Vec<StreamCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_audio_reaches_agent_in_chunks() {
        let h = spawn_controller(BridgeConfig::default());

        // 60ms of caller audio crosses the 50ms chunk target
        for _ in 0..3 {
            h.stream_tx.send(media_event(&quiet_frame())).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        let calls = h.calls.lock().clone();
        let sent: usize = calls
            .iter()
            .filter_map(|c| match c {
                MockCall::SendAudio(n) => Some(*n),
                _ => None,
            })
            .sum();
        // 60ms at 24kHz PCM16
        assert_eq!(sent, 2880);

        drop(h.stream_tx);
        let outcome = h.handle.await.unwrap();
        assert_eq!(outcome, ControllerOutcome::ProviderDisconnected);
        assert_eq!(h.calls.lock().iter().filter(|c| **c == MockCall::Close).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_audio_paced_to_provider_with_marks() {
        let mut h = spawn_controller(BridgeConfig::default());

        h.agent_tx.send(AgentEvent::UtteranceStart).unwrap();
        // 100ms of model audio = five 20ms frames
        h.agent_tx
            .send(AgentEvent::Audio {
                item_id: "item-1".to_string(),
                content_offset: 0,
                data: vec![0u8; 4800],
            })
            .unwrap();

        // Give the pacing tick time to drain five frames
        tokio::time::sleep(Duration::from_millis(200)).await;

        let commands = drain_commands(&mut h.command_rx).await;
        let media: Vec<_> = commands
            .iter()
            .filter(|c| matches!(c, StreamCommand::Media { .. }))
            .collect();
        let marks: Vec<_> = commands
            .iter()
            .filter(|c| matches!(c, StreamCommand::Mark { .. }))
            .collect();
        assert_eq!(media.len(), 5);
        assert_eq!(marks.len(), 5);

        drop(h.stream_tx);
        h.handle.await.unwrap();
    }

    /// Echo every queued mark command back as a provider ack
    async fn ack_marks(h: &mut Harness) -> usize {
        let mut acked = 0;
        for cmd in drain_commands(&mut h.command_rx).await {
            if let StreamCommand::Mark { mark, .. } = cmd {
                h.stream_tx
                    .send(StreamEvent::Mark {
                        mark,
                        stream_sid: Some("MZtest".to_string()),
                    })
                    .await
                    .unwrap();
                acked += 1;
            }
        }
        acked
    }

    fn forwarded_bytes(calls: &[MockCall]) -> usize {
        calls
            .iter()
            .filter_map(|c| match c {
                MockCall::SendAudio(n) => Some(*n),
                _ => None,
            })
            .sum()
    }

    #[tokio::test(start_paused = true)]
    async fn test_utterance_end_returns_to_listening() {
        let config = BridgeConfig {
            gating: GatingMode::HalfDuplex,
            ..BridgeConfig::default()
        };
        let mut h = spawn_controller(config);

        h.agent_tx.send(AgentEvent::UtteranceStart).unwrap();
        h.agent_tx
            .send(AgentEvent::Audio {
                item_id: "item-1".to_string(),
                content_offset: 0,
                data: vec![0u8; 4800],
            })
            .unwrap();
        h.agent_tx.send(AgentEvent::UtteranceEnd).unwrap();

        // All five frames go out, then the provider acks their marks
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ack_marks(&mut h).await, 5);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The floor is back with the caller: half-duplex forwards again
        for _ in 0..3 {
            h.stream_tx.send(media_event(&quiet_frame())).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(forwarded_bytes(&h.calls.lock()), 2880);

        // And a loud frame no longer counts as a barge-in
        h.stream_tx.send(media_event(&loud_frame())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!h.calls.lock().contains(&MockCall::Cancel));

        drop(h.stream_tx);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_completes_after_jitter_overflow() {
        // A long utterance overruns a small queue; the evicted frames must
        // not keep the session in the speaking state after the survivors
        // are played out and acked
        let config = BridgeConfig {
            jitter_capacity: 4,
            gating: GatingMode::HalfDuplex,
            ..BridgeConfig::default()
        };
        let mut h = spawn_controller(config);

        h.agent_tx.send(AgentEvent::UtteranceStart).unwrap();
        h.agent_tx
            .send(AgentEvent::Audio {
                item_id: "item-1".to_string(),
                content_offset: 0,
                data: vec![0u8; 9600], // ten frames into a four-frame queue
            })
            .unwrap();
        h.agent_tx.send(AgentEvent::UtteranceEnd).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        // Only the surviving frames were transmitted and marked
        assert_eq!(ack_marks(&mut h).await, 4);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Caller audio flows again despite the evicted frames never
        // having been acked
        for _ in 0..3 {
            h.stream_tx.send(media_event(&quiet_frame())).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(forwarded_bytes(&h.calls.lock()), 2880);

        drop(h.stream_tx);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_barge_in_cancels_and_clears() {
        let mut h = spawn_controller(BridgeConfig::default());

        h.agent_tx.send(AgentEvent::UtteranceStart).unwrap();
        h.agent_tx
            .send(AgentEvent::Audio {
                item_id: "item-1".to_string(),
                content_offset: 0,
                data: vec![0u8; 48000], // 1s of audio, mostly still queued
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        h.stream_tx.send(media_event(&loud_frame())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let calls = h.calls.lock().clone();
        assert!(calls.contains(&MockCall::Cancel));

        let commands = drain_commands(&mut h.command_rx).await;
        assert!(commands
            .iter()
            .any(|c| matches!(c, StreamCommand::Clear { .. })));

        // Queue was flushed: no further media after the clear
        let clear_pos = commands
            .iter()
            .position(|c| matches!(c, StreamCommand::Clear { .. }))
            .unwrap();
        assert!(!commands[clear_pos..]
            .iter()
            .any(|c| matches!(c, StreamCommand::Media { .. })));

        drop(h.stream_tx);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_barge_in_interrupts_once() {
        let mut h = spawn_controller(BridgeConfig::default());

        h.agent_tx.send(AgentEvent::UtteranceStart).unwrap();
        h.agent_tx
            .send(AgentEvent::Audio {
                item_id: "item-1".to_string(),
                content_offset: 0,
                data: vec![0u8; 48000],
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        h.stream_tx.send(media_event(&loud_frame())).await.unwrap();
        h.stream_tx.send(media_event(&loud_frame())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let calls = h.calls.lock().clone();
        assert_eq!(
            calls.iter().filter(|c| **c == MockCall::Cancel).count(),
            1,
            "second loud frame hits an already-listening session"
        );
        let commands = drain_commands(&mut h.command_rx).await;
        assert_eq!(
            commands
                .iter()
                .filter(|c| matches!(c, StreamCommand::Clear { .. }))
                .count(),
            1
        );

        drop(h.stream_tx);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_inbound_stream_duration_preserved() {
        let h = spawn_controller(BridgeConfig::default());

        // 400ms of caller audio in 20ms frames
        for _ in 0..20 {
            h.stream_tx.send(media_event(&quiet_frame())).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        drop(h.stream_tx);
        h.handle.await.unwrap();

        // Everything forwarded across chunk flushes plus the final drain:
        // 400ms at 24kHz PCM16
        let sent: usize = h
            .calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                MockCall::SendAudio(n) => Some(*n),
                _ => None,
            })
            .sum();
        assert_eq!(sent, 19200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_interruption_clears_without_cancel() {
        let mut h = spawn_controller(BridgeConfig::default());

        h.agent_tx.send(AgentEvent::UtteranceStart).unwrap();
        h.agent_tx
            .send(AgentEvent::Audio {
                item_id: "item-1".to_string(),
                content_offset: 0,
                data: vec![0u8; 48000],
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        h.agent_tx.send(AgentEvent::Interrupted).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!h.calls.lock().contains(&MockCall::Cancel));
        let commands = drain_commands(&mut h.command_rx).await;
        assert!(commands
            .iter()
            .any(|c| matches!(c, StreamCommand::Clear { .. })));

        drop(h.stream_tx);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_ack_reports_playback() {
        let mut h = spawn_controller(BridgeConfig::default());

        h.agent_tx.send(AgentEvent::UtteranceStart).unwrap();
        h.agent_tx
            .send(AgentEvent::Audio {
                item_id: "item-1".to_string(),
                content_offset: 0,
                data: vec![0u8; 960], // exactly one frame
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let commands = drain_commands(&mut h.command_rx).await;
        let mark_name = commands
            .iter()
            .find_map(|c| match c {
                StreamCommand::Mark { mark, .. } => Some(mark.name.clone()),
                _ => None,
            })
            .expect("mark command expected");

        h.stream_tx
            .send(StreamEvent::Mark {
                mark: voice_bridge_core::MarkName { name: mark_name },
                stream_sid: Some("MZtest".to_string()),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let calls = h.calls.lock().clone();
        assert!(calls
            .iter()
            .any(|c| matches!(c, MockCall::Report(item, 0, 960) if item == "item-1")));

        drop(h.stream_tx);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_mark_ack_is_noop() {
        let h = spawn_controller(BridgeConfig::default());

        h.stream_tx
            .send(StreamEvent::Mark {
                mark: voice_bridge_core::MarkName {
                    name: "999".to_string(),
                },
                stream_sid: Some("MZtest".to_string()),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!h
            .calls
            .lock()
            .iter()
            .any(|c| matches!(c, MockCall::Report(..))));

        drop(h.stream_tx);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_event_closes_agent_exactly_once() {
        let h = spawn_controller(BridgeConfig::default());

        h.stream_tx
            .send(StreamEvent::Stop {
                stream_sid: Some("MZtest".to_string()),
            })
            .await
            .unwrap();

        let outcome = h.handle.await.unwrap();
        assert_eq!(outcome, ControllerOutcome::ProviderStopped);
        assert_eq!(
            h.calls.lock().iter().filter(|c| **c == MockCall::Close).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_duplex_mutes_caller_while_agent_speaks() {
        let config = BridgeConfig {
            gating: GatingMode::HalfDuplex,
            ..BridgeConfig::default()
        };
        let h = spawn_controller(config);

        h.agent_tx.send(AgentEvent::UtteranceStart).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        for _ in 0..5 {
            h.stream_tx.send(media_event(&quiet_frame())).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!h
            .calls
            .lock()
            .iter()
            .any(|c| matches!(c, MockCall::SendAudio(_))));

        drop(h.stream_tx);
        h.handle.await.unwrap();
    }
}
