//! Append-only, time-ordered conversation log.
//!
//! [`MessageTimeline`] is the single source of truth rendered by the UI.  It
//! is fed by both local user input ([`MessageTimeline::append_local`]) and
//! inbound transport envelopes ([`MessageTimeline::append_remote`]).  Append
//! is the only mutation; entries are never edited or removed.
//!
//! Entries are ordered by insertion, not by timestamp, so a local optimistic
//! entry sent before a round trip completes never reorders relative to what
//! the user typed.
//!
//! [`SharedTimeline`] (`Arc<Mutex<MessageTimeline>>`) is cheap to clone and
//! safe to share between the engine loop and the rendering layer.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::transport::{Envelope, Sender};

// ---------------------------------------------------------------------------
// TimelineEntry
// ---------------------------------------------------------------------------

/// One rendered conversation turn, user- or assistant-authored.
///
/// Immutable once appended.  `id` is a local sequence number assigned at
/// append time — strictly increasing and never reused, suitable as a stable
/// rendering key.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    /// Monotonically increasing local sequence number.
    pub id: u64,
    /// Authoring party.
    pub sender: Sender,
    /// Opaque message text.
    pub text: String,
    /// Authoring time (local append time, or the envelope's own timestamp).
    pub timestamp: DateTime<Utc>,
    /// Whether the originating envelope carried an audio attachment.
    pub has_audio: bool,
}

// ---------------------------------------------------------------------------
// MessageTimeline
// ---------------------------------------------------------------------------

/// Append-only log of [`TimelineEntry`] values.
#[derive(Debug, Default)]
pub struct MessageTimeline {
    entries: Vec<TimelineEntry>,
    next_id: u64,
}

impl MessageTimeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user-authored entry with the current time.
    ///
    /// Used for both typed and transcribed input so the two modalities render
    /// identically.  Returns a clone of the appended entry.
    pub fn append_local(&mut self, text: impl Into<String>) -> TimelineEntry {
        let entry = TimelineEntry {
            id: self.take_id(),
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
            has_audio: false,
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Derive an entry from an inbound envelope and append it.
    ///
    /// The sender defaults to [`Sender::Assistant`] and the timestamp to
    /// `received_at` when the envelope does not carry its own.
    pub fn append_remote(&mut self, envelope: &Envelope, received_at: DateTime<Utc>) -> TimelineEntry {
        let entry = TimelineEntry {
            id: self.take_id(),
            sender: envelope.sender.unwrap_or(Sender::Assistant),
            text: envelope.content.clone(),
            timestamp: envelope.timestamp.unwrap_or(received_at),
            has_audio: envelope.audio.is_some(),
        };
        self.entries.push(entry.clone());
        entry
    }

    /// The full ordered sequence of entries, oldest first.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no entry has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Sequence ids are handed out exactly once, even if an append is later
    // observed out of wall-clock timestamp order.
    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

// ---------------------------------------------------------------------------
// SharedTimeline
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`MessageTimeline`].
///
/// Cheap to clone (`Arc` clone).  Lock for a short critical section; do
/// **not** hold the lock across `.await` points.
pub type SharedTimeline = Arc<Mutex<MessageTimeline>>;

/// Construct a new [`SharedTimeline`] wrapping an empty timeline.
pub fn new_shared_timeline() -> SharedTimeline {
    Arc::new(Mutex::new(MessageTimeline::new()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EnvelopeKind;

    fn remote(content: &str) -> Envelope {
        Envelope::message(content)
    }

    #[test]
    fn append_local_creates_user_entry() {
        let mut timeline = MessageTimeline::new();
        let entry = timeline.append_local("I have a fever");

        assert_eq!(entry.sender, Sender::User);
        assert_eq!(entry.text, "I have a fever");
        assert!(!entry.has_audio);
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn append_remote_defaults_sender_to_assistant() {
        let mut timeline = MessageTimeline::new();
        let entry = timeline.append_remote(&remote("How long?"), Utc::now());

        assert_eq!(entry.sender, Sender::Assistant);
        assert_eq!(entry.text, "How long?");
    }

    #[test]
    fn append_remote_keeps_explicit_sender() {
        let mut timeline = MessageTimeline::new();
        let mut env = remote("echo");
        env.sender = Some(Sender::User);

        let entry = timeline.append_remote(&env, Utc::now());
        assert_eq!(entry.sender, Sender::User);
    }

    #[test]
    fn append_remote_defaults_timestamp_to_receipt_time() {
        let mut timeline = MessageTimeline::new();
        let received_at = Utc::now();

        let entry = timeline.append_remote(&remote("hi"), received_at);
        assert_eq!(entry.timestamp, received_at);
    }

    #[test]
    fn append_remote_keeps_envelope_timestamp() {
        let mut timeline = MessageTimeline::new();
        let authored: DateTime<Utc> = "2024-03-01T10:15:30Z".parse().unwrap();

        let env = Envelope {
            kind: EnvelopeKind::Message,
            content: "hi".into(),
            sender: None,
            audio: None,
            timestamp: Some(authored),
        };

        let entry = timeline.append_remote(&env, Utc::now());
        assert_eq!(entry.timestamp, authored);
    }

    #[test]
    fn append_remote_flags_audio_attachment() {
        let mut timeline = MessageTimeline::new();
        let mut env = remote("with audio");
        env.audio = Some("AAAA".into());

        let entry = timeline.append_remote(&env, Utc::now());
        assert!(entry.has_audio);
    }

    /// Ids must be strictly increasing and never reused across entries from
    /// different sources, preserving call order.
    #[test]
    fn mixed_appends_preserve_order_and_assign_increasing_ids() {
        let mut timeline = MessageTimeline::new();

        timeline.append_local("first");
        timeline.append_remote(&remote("second"), Utc::now());
        timeline.append_local("third");
        timeline.append_remote(&remote("fourth"), Utc::now());

        let texts: Vec<&str> = timeline.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third", "fourth"]);

        let ids: Vec<u64> = timeline.entries().iter().map(|e| e.id).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "ids must strictly increase: {ids:?}");
        }
    }

    /// An entry with an older timestamp than its predecessor still lands
    /// after it — insertion order wins over wall-clock order.
    #[test]
    fn insertion_order_wins_over_timestamp_order() {
        let mut timeline = MessageTimeline::new();
        timeline.append_local("typed first");

        let env = Envelope {
            kind: EnvelopeKind::Message,
            content: "authored earlier".into(),
            sender: None,
            audio: None,
            timestamp: Some("2000-01-01T00:00:00Z".parse().unwrap()),
        };
        timeline.append_remote(&env, Utc::now());

        assert_eq!(timeline.entries()[0].text, "typed first");
        assert_eq!(timeline.entries()[1].text, "authored earlier");
        assert!(timeline.entries()[0].id < timeline.entries()[1].id);
    }

    #[test]
    fn shared_timeline_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedTimeline>();
    }

    #[test]
    fn empty_timeline_reports_empty() {
        let timeline = MessageTimeline::new();
        assert!(timeline.is_empty());
        assert_eq!(timeline.len(), 0);
        assert!(timeline.entries().is_empty());
    }
}
