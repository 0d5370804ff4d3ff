//! Audio subsystem — capture, end-of-utterance detection, artifact encoding
//! and assistant playback.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (channel) → SilenceDetector
//!           → downmix_to_mono → encode_wav → transcription bridge
//!
//! Inbound audio attachment → base64 decode → PlaybackCoordinator
//! ```

pub mod capture;
pub mod playback;
pub mod silence;
pub mod wav;

pub use capture::{ActiveCapture, AudioChunk, CaptureError, CaptureSource, MicSource};
pub use playback::{PlaybackBackend, PlaybackCoordinator, PlaybackError};
pub use silence::SilenceDetector;
pub use wav::{downmix_to_mono, encode_wav, WavError};

// test-only re-exports so the voice controller tests can script capture
// sessions without spelling out the full module path.
#[cfg(test)]
pub use capture::{DeniedCaptureSource, MockCaptureSource};
