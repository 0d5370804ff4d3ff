//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle and streams
//! [`AudioChunk`]s into an unbounded channel from the audio callback.
//!
//! `cpal::Stream` is not `Send` on every platform, so [`MicSource`] keeps the
//! live stream on a dedicated capture thread and hands the caller an
//! [`ActiveCapture`]: the chunk receiver plus a guard whose drop stops the
//! thread and releases the microphone.  [`CaptureSource`] is the seam the
//! voice controller records through — the real microphone in production, a
//! scripted source in tests.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]` at the device's
/// native rate; [`crate::audio::downmix_to_mono`] collapses channels before
/// the recording artifact is encoded.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The capture thread disappeared before reporting readiness.
    #[error("capture thread terminated during startup")]
    ThreadStartup,
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Probe the system default input device and its preferred stream
    /// configuration.
    fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Start recording and send [`AudioChunk`]s to `tx`.
    ///
    /// The cpal callback runs on a dedicated audio thread; each time the
    /// hardware delivers a buffer the raw `f32` samples are wrapped in an
    /// [`AudioChunk`] and forwarded over the channel.  Send errors (receiver
    /// dropped) are silently ignored so the audio thread never panics.
    fn start(&self, tx: mpsc::UnboundedSender<AudioChunk>) -> Result<cpal::Stream, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let chunk = AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                };
                // Ignore send errors; the receiver may have been dropped.
                let _ = tx.send(chunk);
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None, // no timeout
        )?;

        stream.play()?;
        Ok(stream)
    }
}

// ---------------------------------------------------------------------------
// CaptureSource / ActiveCapture
// ---------------------------------------------------------------------------

/// Live capture session: the chunk stream plus the guard keeping it alive.
///
/// Dropping [`ActiveCapture`] (or just its guard) stops the underlying
/// stream and releases the microphone.
pub struct ActiveCapture {
    /// Receives chunks in capture order.
    pub chunks: mpsc::UnboundedReceiver<AudioChunk>,
    /// Keeps the capture thread alive; dropped to stop recording.
    _guard: Box<dyn std::any::Any + Send>,
}

impl ActiveCapture {
    /// Assemble a session from a chunk receiver and an opaque stop guard.
    pub fn new(
        chunks: mpsc::UnboundedReceiver<AudioChunk>,
        guard: Box<dyn std::any::Any + Send>,
    ) -> Self {
        Self {
            chunks,
            _guard: guard,
        }
    }
}

/// Source of capture sessions.
///
/// Object-safe and `Send + Sync` so the controller can hold it behind an
/// `Arc<dyn CaptureSource>`.  At most one session is requested at a time;
/// the controller's state machine enforces that.
pub trait CaptureSource: Send + Sync {
    /// Acquire the input stream and start delivering chunks.
    fn start(&self) -> Result<ActiveCapture, CaptureError>;
}

// ---------------------------------------------------------------------------
// MicSource
// ---------------------------------------------------------------------------

/// Production [`CaptureSource`] backed by the system default microphone.
pub struct MicSource;

impl CaptureSource for MicSource {
    /// Spawn a capture thread owning the cpal stream.
    ///
    /// The thread reports the stream-open outcome over a handshake channel,
    /// then parks until the stop guard is dropped.  Device probing takes a
    /// few milliseconds at most, so the synchronous handshake is harmless to
    /// the caller.
    fn start(&self) -> Result<ActiveCapture, CaptureError> {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), CaptureError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let stream = match AudioCapture::new().and_then(|cap| cap.start(chunk_tx)) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Parks until the guard on the other end is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("mic-capture thread stopped, microphone released");
            })
            .map_err(|_| CaptureError::ThreadStartup)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(ActiveCapture::new(chunk_rx, Box::new(stop_tx))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::ThreadStartup),
        }
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Scripted [`CaptureSource`] used by controller tests.
///
/// Hands out a pre-wired chunk receiver on the first `start()` call; the
/// test side feeds chunks through the paired sender.
#[cfg(test)]
pub struct MockCaptureSource {
    session: std::sync::Mutex<Option<mpsc::UnboundedReceiver<AudioChunk>>>,
    started: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockCaptureSource {
    /// Create a mock source and the sender used to feed it chunks.
    pub fn new() -> (Self, mpsc::UnboundedSender<AudioChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session: std::sync::Mutex::new(Some(rx)),
                started: std::sync::atomic::AtomicUsize::new(0),
            },
            tx,
        )
    }

    /// How many times `start()` has been called.
    pub fn start_count(&self) -> usize {
        self.started.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl CaptureSource for MockCaptureSource {
    fn start(&self) -> Result<ActiveCapture, CaptureError> {
        self.started
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let rx = self
            .session
            .lock()
            .unwrap()
            .take()
            .ok_or(CaptureError::NoDevice)?;
        Ok(ActiveCapture::new(rx, Box::new(())))
    }
}

/// [`CaptureSource`] that always fails, simulating a denied microphone.
#[cfg(test)]
pub struct DeniedCaptureSource;

#[cfg(test)]
impl CaptureSource for DeniedCaptureSource {
    fn start(&self) -> Result<ActiveCapture, CaptureError> {
        Err(CaptureError::NoDevice)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
