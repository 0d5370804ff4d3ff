//! Assistant audio playback with an exclusive, preemptible handle.
//!
//! [`PlaybackCoordinator`] owns a dedicated playback thread; the thread owns
//! the output stream and at most one live sink.  A new attachment preempts:
//! the previous sink is stopped and released before the next one starts, and
//! nothing is ever queued.  [`PlaybackCoordinator::stop_all`] halts playback
//! and is called on session teardown so no orphaned audio outlives the
//! engine.
//!
//! The decode/output side sits behind [`PlaybackBackend`] so the exclusivity
//! rule is testable without an audio device.  When the platform has no
//! output device the coordinator degrades to a logged no-op.

use std::io::Cursor;
use std::sync::mpsc;

use thiserror::Error;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening the output or decoding an attachment.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No output device, or the device rejected the stream.
    #[error("audio output unavailable: {0}")]
    Output(String),

    /// The attachment bytes could not be decoded as audio.
    #[error("failed to decode audio attachment: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// PlaybackBackend
// ---------------------------------------------------------------------------

/// Decode-and-play backend driven by the playback thread.
///
/// Implementations live entirely on that thread, so they do not need to be
/// `Send`; only the factory that constructs them does.
pub trait PlaybackBackend {
    /// Decode `audio` and start playing it.  Called only while no playback
    /// is active — the coordinator stops the previous one first.
    fn play(&mut self, audio: Vec<u8>) -> Result<(), PlaybackError>;

    /// Stop and release the active playback, if any.  Idempotent.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// RodioBackend
// ---------------------------------------------------------------------------

/// Production backend: one `rodio` output stream, at most one sink.
struct RodioBackend {
    // The stream must stay alive for the sink to produce sound.
    _stream: rodio::OutputStream,
    handle: rodio::OutputStreamHandle,
    sink: Option<rodio::Sink>,
}

impl RodioBackend {
    fn new() -> Result<Self, PlaybackError> {
        let (stream, handle) =
            rodio::OutputStream::try_default().map_err(|e| PlaybackError::Output(e.to_string()))?;
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
        })
    }
}

impl PlaybackBackend for RodioBackend {
    fn play(&mut self, audio: Vec<u8>) -> Result<(), PlaybackError> {
        let decoder = rodio::Decoder::new(Cursor::new(audio))
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;
        let sink =
            rodio::Sink::try_new(&self.handle).map_err(|e| PlaybackError::Output(e.to_string()))?;

        sink.append(decoder);
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackCoordinator
// ---------------------------------------------------------------------------

enum PlaybackCommand {
    Play(Vec<u8>),
    StopAll,
}

/// Serialises playback onto a dedicated thread with preempt-and-stop
/// semantics.
pub struct PlaybackCoordinator {
    tx: mpsc::Sender<PlaybackCommand>,
}

impl PlaybackCoordinator {
    /// Create a coordinator backed by the system default output device.
    pub fn new() -> Self {
        Self::with_backend_factory(RodioBackend::new)
    }

    /// Create a coordinator with an explicit backend factory.
    ///
    /// The factory runs on the playback thread, which lets the backend hold
    /// non-`Send` resources such as `rodio::OutputStream`.  When it fails the
    /// coordinator logs once and swallows all further commands.
    pub fn with_backend_factory<B, F>(factory: F) -> Self
    where
        B: PlaybackBackend,
        F: FnOnce() -> Result<B, PlaybackError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<PlaybackCommand>();

        let spawned = std::thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                let mut backend = match factory() {
                    Ok(backend) => backend,
                    Err(e) => {
                        log::warn!("playback disabled: {e}");
                        // Keep draining so senders never block or error.
                        while rx.recv().is_ok() {}
                        return;
                    }
                };

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        PlaybackCommand::Play(audio) => {
                            // Preempt: the previous playback is stopped and
                            // released before the next one starts.
                            backend.stop();
                            if let Err(e) = backend.play(audio) {
                                log::warn!("playback failed: {e}");
                            }
                        }
                        PlaybackCommand::StopAll => backend.stop(),
                    }
                }

                backend.stop();
                log::debug!("audio-playback thread stopped");
            });

        if spawned.is_err() {
            log::warn!("failed to spawn audio-playback thread; playback disabled");
        }

        Self { tx }
    }

    /// Play a decoded audio attachment, preempting any active playback.
    pub fn play(&self, audio: Vec<u8>) {
        let _ = self.tx.send(PlaybackCommand::Play(audio));
    }

    /// Halt any active playback.  Called on session teardown; idempotent.
    pub fn stop_all(&self) {
        let _ = self.tx.send(PlaybackCommand::StopAll);
    }
}

impl Default for PlaybackCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
