//! Transcription bridge — turns a finished recording into text.
//!
//! [`TranscriptionBridge`] is the async seam consumed by the voice capture
//! controller.  [`HttpTranscriber`] is the production implementation: a
//! single request/response call against the remote speech-to-text endpoint.
//! No retry is attempted here; retry policy belongs to the caller, and the
//! caller deliberately does not retry either.
//!
//! [`MockTranscriber`] (under `#[cfg(test)]`) is a scripted stand-in for
//! controller and engine tests.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpTranscriber;

// ---------------------------------------------------------------------------
// TranscribeError
// ---------------------------------------------------------------------------

/// Errors that can occur while transcribing a recording.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// HTTP transport or connection error.
    #[error("transcription request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("transcription request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status code.
    #[error("transcription service returned status {0}")]
    Status(u16),

    /// The response body could not be parsed as expected JSON.
    #[error("failed to parse transcription response: {0}")]
    Parse(String),

    /// The service recognised no text in the recording.
    #[error("transcription returned no text")]
    EmptyTranscript,
}

impl From<reqwest::Error> for TranscribeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranscribeError::Timeout
        } else {
            TranscribeError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptionBridge trait
// ---------------------------------------------------------------------------

/// Async request/response adapter from a recording artifact to text.
///
/// Implementors must be `Send + Sync` so they can be shared as an
/// `Arc<dyn TranscriptionBridge>`.
#[async_trait]
pub trait TranscriptionBridge: Send + Sync {
    /// Send the WAV-encoded recording and await the recognised text.
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, TranscribeError>;
}

// Compile-time assertion: Box<dyn TranscriptionBridge> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn TranscriptionBridge>) {}
};

// ---------------------------------------------------------------------------
// MockTranscriber
// ---------------------------------------------------------------------------

/// Scripted [`TranscriptionBridge`] for tests.
#[cfg(test)]
pub struct MockTranscriber {
    response: std::sync::Mutex<Result<String, ()>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTranscriber {
    /// A bridge that always succeeds with `text`.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: std::sync::Mutex::new(Ok(text.into())),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// A bridge that always fails with [`TranscribeError::EmptyTranscript`].
    pub fn failing() -> Self {
        Self {
            response: std::sync::Mutex::new(Err(())),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// How many times `transcribe` was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl TranscriptionBridge for MockTranscriber {
    async fn transcribe(&self, _wav: Vec<u8>) -> Result<String, TranscribeError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match &*self.response.lock().unwrap() {
            Ok(text) => Ok(text.clone()),
            Err(()) => Err(TranscribeError::EmptyTranscript),
        }
    }
}
