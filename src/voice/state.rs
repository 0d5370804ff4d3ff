//! Capture lifecycle state, shared between the controller and the engine.

use std::sync::{Arc, Mutex};

/// Lifecycle of the voice capture controller.
///
/// ```text
/// Idle → Recording → Finalizing → Idle
///   ↘ Error (capture acquisition failed) → Idle (acknowledged)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No recording in progress; `start` is accepted.
    Idle,
    /// The microphone is live and chunks are streaming in.
    Recording,
    /// Capture has ended; the recording is being transcribed.
    Finalizing,
    /// Acquiring the microphone failed.  Cleared by
    /// [`acknowledge_error`](super::VoiceCaptureController::acknowledge_error)
    /// once the failure has been surfaced.
    Error,
}

impl CaptureState {
    /// `true` while a recording session owns the pipeline.
    pub fn is_busy(&self) -> bool {
        matches!(self, CaptureState::Recording | CaptureState::Finalizing)
    }
}

/// Capture state shared across the controller, its session task and the
/// engine.
pub type SharedCaptureState = Arc<Mutex<CaptureState>>;

/// Fresh shared state, starting at [`CaptureState::Idle`].
pub fn new_shared_state() -> SharedCaptureState {
    Arc::new(Mutex::new(CaptureState::Idle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_recording_and_finalizing_are_busy() {
        assert!(!CaptureState::Idle.is_busy());
        assert!(CaptureState::Recording.is_busy());
        assert!(CaptureState::Finalizing.is_busy());
        assert!(!CaptureState::Error.is_busy());
    }

    #[test]
    fn shared_state_starts_idle() {
        let state = new_shared_state();
        assert_eq!(*state.lock().unwrap(), CaptureState::Idle);
    }
}
