//! Push-to-talk capture controller.
//!
//! [`VoiceCaptureController`] drives one recording at a time through
//! `Idle → Recording → Finalizing → Idle`.  While recording, every captured
//! chunk is accumulated and fed to the [`SilenceDetector`]; a sustained
//! silent span (or the utterance-length cap) finalizes the recording without
//! an explicit stop.  Finalizing downmixes the buffer, encodes it as WAV and
//! sends it through the [`TranscriptionBridge`]; the resulting
//! [`VoiceOutcome`] is delivered on the outcome channel.
//!
//! A `start` while a session is in flight is rejected with
//! [`VoiceError::Busy`] and leaves the session untouched.  `cancel` discards
//! the recording at any point, including an in-flight transcription request.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{
    downmix_to_mono, encode_wav, ActiveCapture, CaptureError, CaptureSource, SilenceDetector,
    WavError,
};
use crate::config::AudioConfig;
use crate::transcribe::{TranscribeError, TranscriptionBridge};

use super::state::{new_shared_state, CaptureState, SharedCaptureState};

// ---------------------------------------------------------------------------
// VoiceError / VoiceOutcome
// ---------------------------------------------------------------------------

/// Errors surfaced by the voice capture controller.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// `start` was called while a recording was already in flight.
    #[error("a recording is already in progress")]
    Busy,

    /// The microphone could not be acquired.
    #[error("microphone unavailable: {0}")]
    Microphone(#[from] CaptureError),

    /// Capture finished but produced no audio.
    #[error("recording produced no audio")]
    EmptyRecording,

    /// The recording could not be encoded as WAV.
    #[error("failed to encode recording: {0}")]
    Encode(#[from] WavError),

    /// The transcription request failed.
    #[error(transparent)]
    Transcription(#[from] TranscribeError),
}

/// Terminal result of one recording session.
#[derive(Debug)]
pub enum VoiceOutcome {
    /// The utterance was transcribed; the text is ready to send.
    Transcript(String),
    /// The recording was cancelled and discarded.
    Cancelled,
    /// Capture or transcription failed after the recording started.
    Failed(VoiceError),
}

// ---------------------------------------------------------------------------
// VoiceCaptureController
// ---------------------------------------------------------------------------

enum ControlSignal {
    Stop,
    Cancel,
}

/// Single-session push-to-talk controller.
pub struct VoiceCaptureController {
    source: Arc<dyn CaptureSource>,
    bridge: Arc<dyn TranscriptionBridge>,
    config: AudioConfig,
    state: SharedCaptureState,
    outcomes: mpsc::UnboundedSender<VoiceOutcome>,
    /// Control handle of the recording session currently in flight.
    control: Mutex<Option<mpsc::UnboundedSender<ControlSignal>>>,
}

impl VoiceCaptureController {
    /// Build a controller and the receiver its [`VoiceOutcome`]s arrive on.
    pub fn new(
        source: Arc<dyn CaptureSource>,
        bridge: Arc<dyn TranscriptionBridge>,
        config: AudioConfig,
    ) -> (Self, mpsc::UnboundedReceiver<VoiceOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        (
            Self {
                source,
                bridge,
                config,
                state: new_shared_state(),
                outcomes: outcome_tx,
                control: Mutex::new(None),
            },
            outcome_rx,
        )
    }

    /// Current capture state.
    pub fn state(&self) -> CaptureState {
        *self.state.lock().unwrap()
    }

    /// Begin a recording session.
    ///
    /// # Errors
    ///
    /// - [`VoiceError::Busy`] when the state is not `Idle`; the in-flight
    ///   session is unaffected.
    /// - [`VoiceError::Microphone`] when the capture source cannot be
    ///   acquired; the state moves to `Error` until
    ///   [`acknowledge_error`](Self::acknowledge_error) is called.
    pub fn start(&self) -> Result<(), VoiceError> {
        let mut state = self.state.lock().unwrap();
        if *state != CaptureState::Idle {
            return Err(VoiceError::Busy);
        }

        let active = match self.source.start() {
            Ok(active) => active,
            Err(e) => {
                *state = CaptureState::Error;
                log::error!("voice: failed to acquire microphone: {e}");
                return Err(e.into());
            }
        };

        *state = CaptureState::Recording;
        drop(state);

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        *self.control.lock().unwrap() = Some(control_tx);

        log::info!("voice: recording started");
        tokio::spawn(run_session(
            active,
            Arc::clone(&self.bridge),
            self.config.clone(),
            Arc::clone(&self.state),
            self.outcomes.clone(),
            control_rx,
        ));

        Ok(())
    }

    /// Finish the current recording and transcribe it.
    ///
    /// No-op unless the state is `Recording` — stopping while `Finalizing`
    /// or `Idle` does nothing.
    pub fn stop(&self) {
        if self.state() == CaptureState::Recording {
            self.signal(ControlSignal::Stop);
        }
    }

    /// Discard the current recording session, if any.
    ///
    /// Effective both while `Recording` (the buffer is dropped, nothing is
    /// transcribed) and while `Finalizing` (the in-flight transcription is
    /// abandoned and its result discarded).
    pub fn cancel(&self) {
        if self.state().is_busy() {
            self.signal(ControlSignal::Cancel);
        }
    }

    /// Clear the `Error` state once the failure has been surfaced.
    pub fn acknowledge_error(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == CaptureState::Error {
            *state = CaptureState::Idle;
        }
    }

    fn signal(&self, signal: ControlSignal) {
        if let Some(control) = &*self.control.lock().unwrap() {
            // The session may have just finished on its own; that is fine.
            let _ = control.send(signal);
        }
    }
}

// ---------------------------------------------------------------------------
// Recording session task
// ---------------------------------------------------------------------------

/// One recording session: accumulate chunks until silence, a stop, a cancel
/// or the length cap; then transcribe and report the outcome.
async fn run_session(
    mut active: ActiveCapture,
    bridge: Arc<dyn TranscriptionBridge>,
    config: AudioConfig,
    state: SharedCaptureState,
    outcomes: mpsc::UnboundedSender<VoiceOutcome>,
    mut control: mpsc::UnboundedReceiver<ControlSignal>,
) {
    let mut detector = SilenceDetector::new(
        config.frame_size,
        Duration::from_millis(config.silence_threshold_ms),
    );
    let cap = Duration::from_secs_f32(config.max_utterance_secs);
    let started = Instant::now();

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = 0u32;
    let mut channels = 1u16;
    let mut cancelled = false;

    loop {
        // Biased: audio already captured is drained before a stop or cancel
        // is honoured, so a stop never races the chunks preceding it.
        tokio::select! {
            biased;

            chunk = active.chunks.recv() => match chunk {
                Some(chunk) => {
                    sample_rate = chunk.sample_rate;
                    channels = chunk.channels;
                    samples.extend_from_slice(&chunk.samples);

                    let now = Instant::now();
                    if detector.push(&chunk.samples, now) {
                        log::info!("voice: silence threshold reached, finalizing");
                        break;
                    }
                    if now.duration_since(started) >= cap {
                        log::info!("voice: utterance length cap reached, finalizing");
                        break;
                    }
                }
                // Capture stream ended on its own (device unplugged);
                // finalize with whatever was recorded.
                None => break,
            },
            signal = control.recv() => match signal {
                Some(ControlSignal::Stop) => break,
                // Controller dropped mid-recording: treat as cancel.
                Some(ControlSignal::Cancel) | None => {
                    cancelled = true;
                    break;
                }
            },
        }
    }

    // Release the microphone before the (potentially slow) transcription.
    drop(active);

    if cancelled {
        finish(&state, &outcomes, VoiceOutcome::Cancelled);
        return;
    }

    *state.lock().unwrap() = CaptureState::Finalizing;
    log::debug!(
        "voice: finalizing {} samples at {} Hz",
        samples.len(),
        sample_rate
    );

    let work = transcribe_recording(samples, channels, sample_rate, bridge);
    tokio::pin!(work);

    let outcome = loop {
        tokio::select! {
            result = &mut work => break match result {
                Ok(text) => VoiceOutcome::Transcript(text),
                Err(e) => VoiceOutcome::Failed(e),
            },
            signal = control.recv() => match signal {
                // Abandon the in-flight request and discard its result.
                Some(ControlSignal::Cancel) | None => break VoiceOutcome::Cancelled,
                // Stop while finalizing is a no-op.
                Some(ControlSignal::Stop) => {}
            },
        }
    };

    finish(&state, &outcomes, outcome);
}

/// Mark the session finished and deliver its outcome.  The state goes back
/// to `Idle` first so a `start` racing the outcome delivery is accepted.
fn finish(
    state: &SharedCaptureState,
    outcomes: &mpsc::UnboundedSender<VoiceOutcome>,
    outcome: VoiceOutcome,
) {
    *state.lock().unwrap() = CaptureState::Idle;
    let _ = outcomes.send(outcome);
}

/// Downmix, encode and transcribe the finished capture buffer.
async fn transcribe_recording(
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    bridge: Arc<dyn TranscriptionBridge>,
) -> Result<String, VoiceError> {
    if samples.is_empty() || sample_rate == 0 {
        return Err(VoiceError::EmptyRecording);
    }

    let mono = downmix_to_mono(&samples, channels);
    let wav = encode_wav(&mono, sample_rate)?;
    let text = bridge.transcribe(wav).await?;
    Ok(text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
