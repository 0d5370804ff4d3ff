//! Recording artifact encoding.
//!
//! The transcription endpoint accepts a single WAV file per utterance, so the
//! finished capture buffer is downmixed to mono and encoded as 16-bit PCM in
//! memory.  No resampling happens client-side; the recording is uploaded at
//! the device's native rate and the server owns format conversion.

use std::io::Cursor;

use thiserror::Error;

/// Errors that can occur while encoding the recording artifact.
#[derive(Debug, Error)]
pub enum WavError {
    /// The capture buffer contained no samples.
    #[error("recording is empty")]
    Empty,

    /// The WAV writer rejected the stream parameters or a sample.
    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),
}

/// Average interleaved multi-channel samples down to mono.
///
/// A trailing incomplete frame (fewer samples than `channels`) is dropped.
/// Mono input is returned unchanged.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Encode mono `f32` samples as an in-memory 16-bit PCM WAV file.
///
/// Samples are clamped to `[-1.0, 1.0]` before conversion so an occasional
/// hot sample cannot wrap around.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, WavError> {
    if samples.is_empty() {
        return Err(WavError::Empty);
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_mono_is_identity() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn downmix_stereo_averages_pairs() {
        let samples = vec![1.0, 0.0, 0.5, -0.5];
        assert_eq!(downmix_to_mono(&samples, 2), vec![0.5, 0.0]);
    }

    #[test]
    fn downmix_drops_trailing_partial_frame() {
        let samples = vec![1.0, 0.0, 0.5];
        assert_eq!(downmix_to_mono(&samples, 2), vec![0.5]);
    }

    #[test]
    fn encode_produces_parseable_wav() {
        let samples = vec![0.0_f32; 1600];
        let bytes = encode_wav(&samples, 16_000).expect("encode");

        let reader = hound::WavReader::new(Cursor::new(bytes)).expect("parse");
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 1600);
    }

    #[test]
    fn encode_clamps_out_of_range_samples() {
        let bytes = encode_wav(&[2.0, -2.0], 16_000).expect("encode");
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).expect("parse");

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn encode_empty_is_an_error() {
        assert!(matches!(encode_wav(&[], 16_000), Err(WavError::Empty)));
    }
}
