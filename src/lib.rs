//! Realtime voice-and-text client engine for a medical intake assistant.
//!
//! The engine owns one conversation at a time and multiplexes four moving
//! parts:
//!
//! - [`transport`] — a duplex WebSocket session carrying JSON message
//!   envelopes, one session per conversation, no reconnect.
//! - [`voice`] — push-to-talk capture with FFT-based end-of-utterance
//!   detection; a finished recording is transcribed remotely and the text is
//!   sent exactly like typed input.
//! - [`timeline`] — the append-only conversation log the UI renders.
//! - [`audio`] — microphone capture, WAV encoding and exclusive playback of
//!   synthesized assistant audio.
//!
//! [`engine::SessionEngine`] wires them together; a front end drives it
//! through [`engine::EngineHandle`]:
//!
//! ```rust,no_run
//! use intake_chat::config::EngineConfig;
//! use intake_chat::engine::SessionEngine;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load()?;
//! let (engine, handle) = SessionEngine::connect(&config, "session-1").await?;
//! tokio::spawn(engine.run());
//!
//! handle.send_text("I have a fever");
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod engine;
pub mod timeline;
pub mod transcribe;
pub mod transport;
pub mod voice;
