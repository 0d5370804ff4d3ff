//! Frequency-domain end-of-utterance detection.
//!
//! [`SilenceDetector`] consumes the live capture stream in fixed-size frames
//! (default 2048 samples).  Each complete frame is run through a forward real
//! FFT and reduced to the mean magnitude of its spectrum.  Any mean above
//! zero counts as signal and refreshes `last_sound`; once the span since
//! `last_sound` reaches the configured threshold the utterance is considered
//! finished and the recording can finalize without an explicit stop.
//!
//! The caller supplies the observation time for every push, so the detector
//! itself is deterministic and directly testable with synthetic clocks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};

/// Detects the end of an utterance from sustained sub-audible input.
pub struct SilenceDetector {
    fft: Arc<dyn RealToComplex<f32>>,
    /// Analysis frame size in samples.
    frame_size: usize,
    /// Silent span after which the utterance is considered finished.
    threshold: Duration,
    /// Samples waiting for a complete frame.
    pending: Vec<f32>,
    /// FFT input scratch; `process` consumes its input in place.
    scratch: Vec<f32>,
    /// FFT output buffer, `frame_size / 2 + 1` bins.
    spectrum: Vec<Complex32>,
    /// When signal was last observed.  Seeded by the first push so that a
    /// recording that opens with silence still times out.
    last_sound: Option<Instant>,
}

impl SilenceDetector {
    /// Create a detector with the given analysis frame size and silence
    /// threshold.
    ///
    /// # Panics
    ///
    /// Panics when `frame_size` is zero.
    pub fn new(frame_size: usize, threshold: Duration) -> Self {
        assert!(frame_size > 0, "frame_size must be > 0");
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(frame_size);
        let spectrum = fft.make_output_vec();

        Self {
            fft,
            frame_size,
            threshold,
            pending: Vec::with_capacity(frame_size * 2),
            scratch: vec![0.0; frame_size],
            spectrum,
            last_sound: None,
        }
    }

    /// Silence threshold currently in use.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Feed captured samples observed at `now`.
    ///
    /// Processes every complete frame accumulated so far and returns `true`
    /// once the silent span has reached the threshold — the signal to
    /// finalize the recording.  Callers stop feeding the detector after the
    /// first `true`.
    pub fn push(&mut self, samples: &[f32], now: Instant) -> bool {
        let last_sound = *self.last_sound.get_or_insert(now);

        self.pending.extend_from_slice(samples);

        let mut refreshed = false;
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            self.scratch.copy_from_slice(&self.pending);
            self.pending = rest;

            if self.frame_mean_magnitude() > 0.0 {
                refreshed = true;
            }
        }

        if refreshed {
            self.last_sound = Some(now);
            return false;
        }

        now.duration_since(last_sound) >= self.threshold
    }

    /// Mean magnitude across the frequency-domain representation of the
    /// frame currently in `scratch`.
    fn frame_mean_magnitude(&mut self) -> f32 {
        if let Err(e) = self.fft.process(&mut self.scratch, &mut self.spectrum) {
            log::warn!("silence: FFT failed, treating frame as silent: {e}");
            return 0.0;
        }

        let sum: f32 = self.spectrum.iter().map(|bin| bin.norm()).sum();
        sum / self.spectrum.len() as f32
    }
}

impl std::fmt::Debug for SilenceDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SilenceDetector")
            .field("frame_size", &self.frame_size)
            .field("threshold", &self.threshold)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 2048;

    fn detector() -> SilenceDetector {
        SilenceDetector::new(FRAME, Duration::from_millis(2000))
    }

    fn silent_frame() -> Vec<f32> {
        vec![0.0; FRAME]
    }

    fn loud_frame() -> Vec<f32> {
        vec![0.5; FRAME]
    }

    #[test]
    fn silence_alone_times_out_after_threshold() {
        let mut det = detector();
        let start = Instant::now();

        assert!(!det.push(&silent_frame(), start));
        assert!(!det.push(&silent_frame(), start + Duration::from_millis(1000)));
        assert!(!det.push(&silent_frame(), start + Duration::from_millis(1999)));
        assert!(det.push(&silent_frame(), start + Duration::from_millis(2000)));
    }

    #[test]
    fn sound_refreshes_the_silence_window() {
        let mut det = detector();
        let start = Instant::now();

        assert!(!det.push(&silent_frame(), start));
        // Signal at t=1500 ms pushes the deadline out to t=3500 ms.
        assert!(!det.push(&loud_frame(), start + Duration::from_millis(1500)));
        assert!(!det.push(&silent_frame(), start + Duration::from_millis(3000)));
        assert!(det.push(&silent_frame(), start + Duration::from_millis(3500)));
    }

    /// Zero amplitude for >= 2000 ms after the last non-zero frame must
    /// trigger the end-of-utterance verdict.
    #[test]
    fn two_seconds_of_zero_after_last_sound_triggers() {
        let mut det = detector();
        let start = Instant::now();

        assert!(!det.push(&loud_frame(), start));
        let mut verdicts = Vec::new();
        for ms in (100..=2000).step_by(100) {
            verdicts.push(det.push(&silent_frame(), start + Duration::from_millis(ms)));
        }

        // Exactly the final push crosses the threshold.
        assert_eq!(verdicts.iter().filter(|&&v| v).count(), 1);
        assert_eq!(verdicts.last(), Some(&true));
    }

    #[test]
    fn partial_frames_are_buffered_not_analysed() {
        let mut det = detector();
        let start = Instant::now();

        // Half a frame of loud samples: no complete frame, no refresh, and
        // the silence clock keeps running from the seed time.
        assert!(!det.push(&vec![0.5; FRAME / 2], start));
        assert!(det.push(&[], start + Duration::from_millis(2000)));
    }

    #[test]
    fn split_deliveries_assemble_into_frames() {
        let mut det = detector();
        let start = Instant::now();

        // Two half-frames of signal assemble into one loud frame, which must
        // refresh the window even though each delivery was partial.
        det.push(&vec![0.5; FRAME / 2], start);
        assert!(!det.push(
            &vec![0.5; FRAME / 2],
            start + Duration::from_millis(1900)
        ));
        // 1900 ms + threshold = 3900 ms; at 3800 ms we are still inside it.
        assert!(!det.push(&silent_frame(), start + Duration::from_millis(3800)));
        assert!(det.push(&silent_frame(), start + Duration::from_millis(3900)));
    }

    #[test]
    fn threshold_getter() {
        let det = SilenceDetector::new(FRAME, Duration::from_millis(1500));
        assert_eq!(det.threshold(), Duration::from_millis(1500));
    }

    #[test]
    #[should_panic(expected = "frame_size must be > 0")]
    fn zero_frame_size_panics() {
        SilenceDetector::new(0, Duration::from_millis(2000));
    }
}
