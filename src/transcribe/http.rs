//! HTTP implementation of the transcription bridge.
//!
//! Posts the WAV recording as a multipart upload to
//! `{base_url}/api/speech-to-text` and expects `{"text": "..."}` back.
//! All connection details come from [`TranscriptionConfig`]; nothing is
//! hardcoded.

use async_trait::async_trait;

use crate::config::TranscriptionConfig;

use super::{TranscribeError, TranscriptionBridge};

/// Calls the remote speech-to-text endpoint over HTTP.
pub struct HttpTranscriber {
    client: reqwest::Client,
    config: TranscriptionConfig,
}

impl HttpTranscriber {
    /// Build an `HttpTranscriber` from engine config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.  A default (no-timeout) client is used as a
    /// last-resort fallback if the builder fails (should never happen in
    /// practice).
    pub fn from_config(config: &TranscriptionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl TranscriptionBridge for HttpTranscriber {
    /// Upload `wav` and await the recognised text.
    ///
    /// Fails with [`TranscribeError::EmptyTranscript`] when the service
    /// answers successfully but recognises nothing — callers treat that the
    /// same as any other transcription failure.
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, TranscribeError> {
        let url = format!(
            "{}/api/speech-to-text",
            self.config.base_url.trim_end_matches('/')
        );

        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscribeError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranscribeError::Status(status.as_u16()));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranscribeError::Parse(e.to_string()))?;

        let text = json["text"]
            .as_str()
            .ok_or(TranscribeError::EmptyTranscript)?
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(TranscribeError::EmptyTranscript);
        }

        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
