//! Session engine — the single owner of one intake conversation.
//!
//! [`SessionEngine::connect`] wires the transport session, the voice capture
//! controller, the playback coordinator and the message timeline together,
//! then [`SessionEngine::run`] multiplexes them in one loop:
//!
//! - [`EngineCommand`]s from the UI (send text, start/stop/cancel recording,
//!   shutdown),
//! - inbound [`TransportEvent`]s (envelopes appended to the timeline, audio
//!   attachments handed to playback),
//! - [`VoiceOutcome`]s (a transcript is sent exactly like typed text).
//!
//! Every exit path runs the same teardown: cancel any recording, close the
//! transport, halt playback.  A terminal connection state ends the session;
//! there is no reconnect.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::audio::{CaptureSource, MicSource, PlaybackCoordinator};
use crate::config::EngineConfig;
use crate::timeline::{new_shared_timeline, SharedTimeline, TimelineEntry};
use crate::transcribe::{HttpTranscriber, TranscriptionBridge};
use crate::transport::{
    ConnectionState, Envelope, TransportError, TransportEvent, TransportSession,
};
use crate::voice::{CaptureState, VoiceCaptureController, VoiceError, VoiceOutcome};

// ---------------------------------------------------------------------------
// EngineCommand / EngineEvent
// ---------------------------------------------------------------------------

/// Commands the UI issues to the engine.
#[derive(Debug)]
pub enum EngineCommand {
    /// Send a typed message.
    SendText(String),
    /// Begin a push-to-talk recording.
    StartRecording,
    /// Finish the current recording and transcribe it.
    StopRecording,
    /// Discard the current recording.
    CancelRecording,
    /// End the session.
    Shutdown,
}

/// Events the engine reports back to the UI.
#[derive(Debug)]
pub enum EngineEvent {
    /// A new entry was appended to the timeline.
    Entry(TimelineEntry),
    /// The transport connection state changed.
    Connection(ConnectionState),
    /// The voice capture state changed.
    Capture(CaptureState),
    /// A recoverable failure the UI should surface.
    Error(String),
}

// ---------------------------------------------------------------------------
// EngineCommander / EngineHandle
// ---------------------------------------------------------------------------

/// Cloneable command side of the engine, detachable from the event side so
/// an input task can issue commands while another task consumes events.
#[derive(Clone)]
pub struct EngineCommander {
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineCommander {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.commands.send(EngineCommand::SendText(text.into()));
    }

    pub fn start_recording(&self) {
        let _ = self.commands.send(EngineCommand::StartRecording);
    }

    pub fn stop_recording(&self) {
        let _ = self.commands.send(EngineCommand::StopRecording);
    }

    pub fn cancel_recording(&self) {
        let _ = self.commands.send(EngineCommand::CancelRecording);
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
    }
}

/// The UI's handle to a running engine: command sender, event receiver and
/// a shared view of the timeline.
pub struct EngineHandle {
    commander: EngineCommander,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    timeline: SharedTimeline,
}

impl EngineHandle {
    pub fn send_text(&self, text: impl Into<String>) {
        self.commander.send_text(text);
    }

    pub fn start_recording(&self) {
        self.commander.start_recording();
    }

    pub fn stop_recording(&self) {
        self.commander.stop_recording();
    }

    pub fn cancel_recording(&self) {
        self.commander.cancel_recording();
    }

    pub fn shutdown(&self) {
        self.commander.shutdown();
    }

    /// A detached command sender.
    pub fn commander(&self) -> EngineCommander {
        self.commander.clone()
    }

    /// Await the next engine event.  `None` once the engine has exited.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Shared view of the conversation log.
    pub fn timeline(&self) -> SharedTimeline {
        Arc::clone(&self.timeline)
    }
}

// ---------------------------------------------------------------------------
// SessionEngine
// ---------------------------------------------------------------------------

/// Owner of one conversation's moving parts.
pub struct SessionEngine {
    transport: TransportSession,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    voice: VoiceCaptureController,
    voice_outcomes: mpsc::UnboundedReceiver<VoiceOutcome>,
    playback: PlaybackCoordinator,
    playback_enabled: bool,
    timeline: SharedTimeline,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl SessionEngine {
    /// Connect to the server and assemble the production engine.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the WebSocket handshake
    /// fails; nothing else is constructed in that case.
    pub async fn connect(
        config: &EngineConfig,
        session_id: &str,
    ) -> Result<(Self, EngineHandle), TransportError> {
        let (transport, transport_events) =
            TransportSession::open(&config.transport, session_id).await?;

        let source: Arc<dyn CaptureSource> = Arc::new(MicSource);
        let bridge: Arc<dyn TranscriptionBridge> =
            Arc::new(HttpTranscriber::from_config(&config.transcription));
        let (voice, voice_outcomes) =
            VoiceCaptureController::new(source, bridge, config.audio.clone());

        Ok(Self::assemble(
            transport,
            transport_events,
            voice,
            voice_outcomes,
            PlaybackCoordinator::new(),
            config.playback.enabled,
        ))
    }

    /// Wire pre-built parts into an engine and its handle.
    fn assemble(
        transport: TransportSession,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        voice: VoiceCaptureController,
        voice_outcomes: mpsc::UnboundedReceiver<VoiceOutcome>,
        playback: PlaybackCoordinator,
        playback_enabled: bool,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let timeline = new_shared_timeline();

        let engine = Self {
            transport,
            transport_events,
            voice,
            voice_outcomes,
            playback,
            playback_enabled,
            timeline: Arc::clone(&timeline),
            commands: command_rx,
            events: event_tx,
        };

        let handle = EngineHandle {
            commander: EngineCommander {
                commands: command_tx,
            },
            events: event_rx,
            timeline,
        };

        (engine, handle)
    }

    /// Drive the session until shutdown or a terminal connection state.
    ///
    /// Teardown runs on every exit path: the in-flight recording (if any) is
    /// cancelled, the transport is closed and playback is halted.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(EngineCommand::SendText(text)) => self.post_user_text(text),
                    Some(EngineCommand::StartRecording) => self.start_recording(),
                    Some(EngineCommand::StopRecording) => self.voice.stop(),
                    Some(EngineCommand::CancelRecording) => self.voice.cancel(),
                    Some(EngineCommand::Shutdown) | None => break,
                },
                event = self.transport_events.recv() => match event {
                    Some(TransportEvent::Envelope(envelope)) => self.handle_inbound(envelope),
                    Some(TransportEvent::State(state)) => {
                        let _ = self.events.send(EngineEvent::Connection(state));
                        if state.is_terminal() {
                            break;
                        }
                    }
                    None => break,
                },
                outcome = self.voice_outcomes.recv() => {
                    if let Some(outcome) = outcome {
                        self.handle_voice_outcome(outcome);
                    }
                },
            }
        }

        self.teardown();
    }

    /// Append a user-authored message and transmit it.
    ///
    /// The append is optimistic: the entry stays in the timeline even when
    /// the transmit fails, and the failure is surfaced as an error event.
    fn post_user_text(&mut self, text: String) {
        let entry = self.timeline.lock().unwrap().append_local(&text);
        let _ = self.events.send(EngineEvent::Entry(entry));

        if let Err(e) = self.transport.send(&Envelope::message(text)) {
            log::warn!("engine: failed to send message: {e}");
            let _ = self.events.send(EngineEvent::Error(e.to_string()));
        }
    }

    fn start_recording(&mut self) {
        match self.voice.start() {
            Ok(()) => {
                let _ = self
                    .events
                    .send(EngineEvent::Capture(CaptureState::Recording));
            }
            // Busy is not user-facing: the rejection changes nothing.
            Err(VoiceError::Busy) => {
                log::debug!("engine: start recording ignored, one already in flight");
            }
            Err(e) => {
                let _ = self.events.send(EngineEvent::Capture(CaptureState::Error));
                let _ = self.events.send(EngineEvent::Error(e.to_string()));
                // Failure surfaced; clear the error so the user can retry.
                self.voice.acknowledge_error();
                let _ = self.events.send(EngineEvent::Capture(CaptureState::Idle));
            }
        }
    }

    /// Append an inbound envelope and play its audio attachment, if any.
    fn handle_inbound(&mut self, envelope: Envelope) {
        let entry = self
            .timeline
            .lock()
            .unwrap()
            .append_remote(&envelope, Utc::now());
        let _ = self.events.send(EngineEvent::Entry(entry));

        if !self.playback_enabled {
            return;
        }
        if let Some(audio) = &envelope.audio {
            match BASE64.decode(audio) {
                Ok(bytes) => self.playback.play(bytes),
                Err(e) => {
                    log::warn!("engine: ignoring undecodable audio attachment: {e}");
                }
            }
        }
    }

    /// A finished recording session: a transcript is sent exactly like
    /// typed text; cancellations and failures just return the UI to idle.
    fn handle_voice_outcome(&mut self, outcome: VoiceOutcome) {
        match outcome {
            VoiceOutcome::Transcript(text) => {
                self.post_user_text(text);
            }
            VoiceOutcome::Cancelled => {
                log::debug!("engine: recording cancelled");
            }
            VoiceOutcome::Failed(e) => {
                log::warn!("engine: recording failed: {e}");
                let _ = self.events.send(EngineEvent::Error(e.to_string()));
            }
        }
        let _ = self.events.send(EngineEvent::Capture(CaptureState::Idle));
    }

    fn teardown(&mut self) {
        self.voice.cancel();
        self.transport.close();
        self.playback.stop_all();
        log::info!("engine: session torn down");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
