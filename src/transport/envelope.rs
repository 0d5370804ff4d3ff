//! The wire unit exchanged over the transport session.
//!
//! Envelopes are JSON text frames.  Outbound envelopes carry only the kind
//! and the text content:
//!
//! ```json
//! {"type": "message", "content": "I have a fever"}
//! ```
//!
//! Inbound frames are parsed leniently, because the server side tags frames
//! by author rather than by kind: `type` may be `"message"`, `"bot"`
//! (assistant-authored) or `"user"`, or be absent entirely.  An author tag
//! doubles as the sender when no explicit `sender` field is present.
//! Inbound envelopes may additionally carry a base64 `audio` attachment and
//! an ISO 8601 `timestamp` — with or without a UTC offset; offset-less
//! timestamps are read as UTC and unreadable ones are dropped.  Fields still
//! missing are defaulted at timeline-append time: sender to `Assistant`,
//! timestamp to the receipt time.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// EnvelopeKind
// ---------------------------------------------------------------------------

/// Discriminant of the wire unit.  Serialised as the JSON `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// A conversation message.
    Message,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Which party authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The local patient.
    User,
    /// The remote intake assistant.
    Assistant,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One discrete message unit exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Kind of the envelope (JSON field `type`).
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Opaque text payload; the engine never interprets message bodies.
    pub content: String,
    /// Authoring party; inbound envelopes without one default to assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Sender>,
    /// Optional base64-encoded synthesized-audio attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// Optional authoring time; defaulted to receipt time when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Build an outbound message envelope carrying `content`.
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Message,
            content: content.into(),
            sender: None,
            audio: None,
            timestamp: None,
        }
    }
}

/// Raw inbound shape before leniency rules are applied.
#[derive(Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    content: String,
    #[serde(default)]
    sender: Option<Sender>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = WireEnvelope::deserialize(deserializer)?;

        // The author tags "bot"/"user" imply the sender when no explicit
        // sender field is present.
        let implied_sender = match wire.kind.as_deref() {
            None | Some("message") => None,
            Some("bot") => Some(Sender::Assistant),
            Some("user") => Some(Sender::User),
            Some(other) => {
                return Err(D::Error::unknown_variant(
                    other,
                    &["message", "bot", "user"],
                ));
            }
        };

        Ok(Envelope {
            kind: EnvelopeKind::Message,
            content: wire.content,
            sender: wire.sender.or(implied_sender),
            audio: wire.audio,
            timestamp: wire.timestamp.as_deref().and_then(parse_timestamp),
        })
    }
}

/// Read an inbound timestamp, tolerating the counterpart's offset-less
/// ISO 8601 form.  Unreadable values become `None` (receipt time applies)
/// rather than failing the whole frame.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
