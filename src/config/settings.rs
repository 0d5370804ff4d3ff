//! Engine settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

/// Settings for the WebSocket transport session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base URL of the chat server, without a trailing slash
    /// (e.g. `ws://localhost:8000`).  The session id is appended as
    /// `{server_url}/ws/{session_id}`.
    pub server_url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8000".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptionConfig
// ---------------------------------------------------------------------------

/// Settings for the remote speech-to-text endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Base URL of the transcription service
    /// (e.g. `http://localhost:8000`).  The recording is posted to
    /// `{base_url}/api/speech-to-text`.
    pub base_url: String,
    /// Maximum seconds to wait for a transcription response before timing out.
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for audio capture and end-of-utterance detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Analysis frame size in samples for silence detection.
    pub frame_size: usize,
    /// Milliseconds of sub-audible input after which an utterance is
    /// considered finished and the recording finalizes automatically.
    pub silence_threshold_ms: u64,
    /// Maximum utterance length in seconds; recording finalizes
    /// automatically when reached.
    pub max_utterance_secs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            silence_threshold_ms: 2000,
            max_utterance_secs: 60.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Settings for assistant audio playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Whether synthesized-audio attachments are played at all.
    pub enabled: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level engine configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use intake_chat::config::EngineConfig;
///
/// // Load (returns Default when file is missing)
/// let config = EngineConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// WebSocket transport settings.
    pub transport: TransportConfig,
    /// Remote transcription endpoint settings.
    pub transcription: TranscriptionConfig,
    /// Capture / silence-detection settings.
    pub audio: AudioConfig,
    /// Assistant audio playback settings.
    pub playback: PlaybackConfig,
}

impl EngineConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(EngineConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Verify that a default `EngineConfig` can be serialised to TOML and
    /// deserialised back without any data loss.
    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = EngineConfig::default();
        original.save_to(&path).expect("save");

        let loaded = EngineConfig::load_from(&path).expect("load");

        assert_eq!(original.transport.server_url, loaded.transport.server_url);
        assert_eq!(
            original.transcription.base_url,
            loaded.transcription.base_url
        );
        assert_eq!(
            original.transcription.timeout_secs,
            loaded.transcription.timeout_secs
        );
        assert_eq!(original.audio.frame_size, loaded.audio.frame_size);
        assert_eq!(
            original.audio.silence_threshold_ms,
            loaded.audio.silence_threshold_ms
        );
        assert_eq!(
            original.audio.max_utterance_secs,
            loaded.audio.max_utterance_secs
        );
        assert_eq!(original.playback.enabled, loaded.playback.enabled);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = EngineConfig::load_from(&path).expect("should not error");
        let default = EngineConfig::default();

        assert_eq!(config.transport.server_url, default.transport.server_url);
        assert_eq!(config.audio.frame_size, default.audio.frame_size);
    }

    /// Verify default values match the engine design.
    #[test]
    fn default_values() {
        let cfg = EngineConfig::default();

        assert_eq!(cfg.transport.server_url, "ws://localhost:8000");
        assert_eq!(cfg.transcription.base_url, "http://localhost:8000");
        assert_eq!(cfg.transcription.timeout_secs, 30);
        assert_eq!(cfg.audio.frame_size, 2048);
        assert_eq!(cfg.audio.silence_threshold_ms, 2000);
        assert!(cfg.playback.enabled);
    }

    /// Verify that modified non-default values survive a round trip.
    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = EngineConfig::default();
        cfg.transport.server_url = "wss://intake.example.com".into();
        cfg.transcription.base_url = "https://intake.example.com".into();
        cfg.transcription.timeout_secs = 10;
        cfg.audio.silence_threshold_ms = 1500;
        cfg.playback.enabled = false;

        cfg.save_to(&path).expect("save");
        let loaded = EngineConfig::load_from(&path).expect("load");

        assert_eq!(loaded.transport.server_url, "wss://intake.example.com");
        assert_eq!(loaded.transcription.base_url, "https://intake.example.com");
        assert_eq!(loaded.transcription.timeout_secs, 10);
        assert_eq!(loaded.audio.silence_threshold_ms, 1500);
        assert!(!loaded.playback.enabled);
    }
}
