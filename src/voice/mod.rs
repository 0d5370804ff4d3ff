//! Voice capture — the push-to-talk state machine.
//!
//! One controller, one recording at a time.  See [`VoiceCaptureController`]
//! for the lifecycle and [`CaptureState`] for the states it moves through.

pub mod controller;
pub mod state;

pub use controller::{VoiceCaptureController, VoiceError, VoiceOutcome};
pub use state::{CaptureState, SharedCaptureState};
