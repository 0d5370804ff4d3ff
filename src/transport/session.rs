//! The duplex WebSocket session to the intake assistant.
//!
//! [`TransportSession::open`] connects to `{server_url}/ws/{session_id}` and
//! returns the session plus an event receiver.  Inbound envelopes are
//! delivered in exact receipt order; connection-state transitions are
//! delivered as [`TransportEvent::State`].
//!
//! The state machine is `Connecting → Open → Closed | Errored`.  `Closed`
//! and `Errored` are terminal for a session instance — there is no
//! auto-reconnect; a new conversation requires opening a new session.
//! Outbound sends are rejected (not buffered) while the connection is not
//! open.

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite};

use crate::config::TransportConfig;

use super::Envelope;

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Envelopes can be sent and received.
    Open,
    /// Normal or remote close.  Terminal.
    Closed,
    /// Transport fault.  Terminal.
    Errored,
}

impl ConnectionState {
    /// Returns `true` for states the session can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored)
    }
}

// ---------------------------------------------------------------------------
// TransportEvent / TransportError
// ---------------------------------------------------------------------------

/// Events delivered to the engine, in occurrence order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One inbound envelope, in exact receipt order.
    Envelope(Envelope),
    /// The connection state transitioned.
    State(ConnectionState),
}

/// Errors surfaced by the transport session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket handshake failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// `send` was called while the connection was not open.
    #[error("connection is not open")]
    NotOpen,
}

// ---------------------------------------------------------------------------
// TransportSession
// ---------------------------------------------------------------------------

enum OutboundFrame {
    Envelope(Envelope),
    Close,
}

type SharedConnectionState = Arc<Mutex<ConnectionState>>;

/// Exclusive owner of the connection to the remote endpoint.
pub struct TransportSession {
    session_id: String,
    state: SharedConnectionState,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl TransportSession {
    /// Establish a duplex connection for `session_id`.
    ///
    /// Returns the session and the receiver of [`TransportEvent`]s.  The
    /// first event is always `State(Open)`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the handshake fails; no
    /// session exists in that case.
    pub async fn open(
        config: &TransportConfig,
        session_id: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        let url = format!(
            "{}/ws/{}",
            config.server_url.trim_end_matches('/'),
            session_id
        );

        let state: SharedConnectionState = Arc::new(Mutex::new(ConnectionState::Connecting));

        log::info!("transport: connecting to {url}");
        let (ws, _response) = connect_async(&url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();

        transition(&state, &event_tx, ConnectionState::Open);
        log::info!("transport: session {session_id} open");

        let (mut sink, mut stream) = ws.split();

        // Writer: serialises outbound envelopes onto the socket.
        let writer_state = Arc::clone(&state);
        let writer_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    OutboundFrame::Envelope(envelope) => {
                        let text = match serde_json::to_string(&envelope) {
                            Ok(text) => text,
                            Err(e) => {
                                log::warn!("transport: failed to serialise envelope: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(tungstenite::Message::Text(text)).await {
                            log::warn!("transport: send failed: {e}");
                            transition(&writer_state, &writer_events, ConnectionState::Errored);
                            break;
                        }
                    }
                    OutboundFrame::Close => {
                        let _ = sink.send(tungstenite::Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        });

        // Reader: delivers inbound envelopes in receipt order.
        let reader_state = Arc::clone(&state);
        let reader_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(tungstenite::Message::Text(text)) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                if reader_events
                                    .send(TransportEvent::Envelope(envelope))
                                    .is_err()
                                {
                                    // Engine gone; nothing left to deliver to.
                                    return;
                                }
                            }
                            Err(e) => {
                                log::warn!("transport: ignoring malformed inbound frame: {e}");
                            }
                        }
                    }
                    Ok(tungstenite::Message::Close(_)) => {
                        transition(&reader_state, &reader_events, ConnectionState::Closed);
                        break;
                    }
                    Ok(_) => {
                        // Binary / ping / pong frames carry no envelopes.
                    }
                    Err(e) => {
                        log::warn!("transport: receive failed: {e}");
                        transition(&reader_state, &reader_events, ConnectionState::Errored);
                        break;
                    }
                }
            }

            // Stream ended without a close frame: treat as a remote close.
            transition(&reader_state, &reader_events, ConnectionState::Closed);
        });

        Ok((
            Self {
                session_id: session_id.to_string(),
                state,
                event_tx,
                outbound_tx,
            },
            event_rx,
        ))
    }

    /// The externally supplied session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Transmit an outbound envelope.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotOpen`] unless the state is `Open`.  The
    /// envelope is dropped, never buffered — the caller surfaces the failure
    /// to the user instead.
    pub fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Open {
            return Err(TransportError::NotOpen);
        }
        self.outbound_tx
            .send(OutboundFrame::Envelope(envelope.clone()))
            .map_err(|_| TransportError::NotOpen)
    }

    /// Release the connection.  Idempotent; safe to call from any state.
    pub fn close(&self) {
        let was_open = {
            let state = self.state.lock().unwrap();
            !state.is_terminal()
        };
        if was_open {
            transition(&self.state, &self.event_tx, ConnectionState::Closed);
            let _ = self.outbound_tx.send(OutboundFrame::Close);
            log::info!("transport: session {} closed", self.session_id);
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Move to `next` unless the state is already terminal, emitting a state
/// event on an actual change.
fn transition(
    state: &SharedConnectionState,
    events: &mpsc::UnboundedSender<TransportEvent>,
    next: ConnectionState,
) {
    let changed = {
        let mut state = state.lock().unwrap();
        if state.is_terminal() || *state == next {
            false
        } else {
            *state = next;
            true
        }
    };
    if changed {
        let _ = events.send(TransportEvent::State(next));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::SplitSink;
    use std::future::Future;
    use tokio::net::TcpStream;
    use tokio_tungstenite::WebSocketStream;

    type ServerWs = WebSocketStream<TcpStream>;
    type ServerSink = SplitSink<ServerWs, tungstenite::Message>;

    /// Spawn a one-connection WebSocket server and return its base URL.
    async fn ws_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake");
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    fn config(server_url: String) -> TransportConfig {
        TransportConfig { server_url }
    }

    async fn send_text(sink: &mut ServerSink, text: &str) {
        sink.send(tungstenite::Message::Text(text.to_string()))
            .await
            .expect("server send");
    }

    #[tokio::test]
    async fn open_reports_open_state_first() {
        let url = ws_server(|ws| async move {
            // Hold the connection until the client is done.
            let (_sink, mut stream) = ws.split();
            while stream.next().await.is_some() {}
        })
        .await;

        let (session, mut events) = TransportSession::open(&config(url), "abc123")
            .await
            .expect("open");

        assert_eq!(session.state(), ConnectionState::Open);
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::State(ConnectionState::Open))
        );
    }

    #[tokio::test]
    async fn inbound_envelopes_arrive_in_receipt_order() {
        let url = ws_server(|ws| async move {
            let (mut sink, _stream) = ws.split();
            for i in 0..3 {
                send_text(
                    &mut sink,
                    &format!(r#"{{"type": "message", "content": "msg {i}"}}"#),
                )
                .await;
            }
        })
        .await;

        let (_session, mut events) = TransportSession::open(&config(url), "abc123")
            .await
            .expect("open");

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::State(ConnectionState::Open))
        );
        for i in 0..3 {
            match events.recv().await {
                Some(TransportEvent::Envelope(env)) => {
                    assert_eq!(env.content, format!("msg {i}"));
                }
                other => panic!("expected envelope, got {other:?}"),
            }
        }
    }

    /// Frames shaped the way the existing server emits them (author-tagged
    /// `type`, offset-less timestamp) must be delivered, not skipped.
    #[tokio::test]
    async fn counterpart_author_tagged_frames_are_delivered() {
        let url = ws_server(|ws| async move {
            let (mut sink, _stream) = ws.split();
            send_text(
                &mut sink,
                r#"{"type": "bot", "content": "How long?", "timestamp": "2026-08-30T12:34:56.789012"}"#,
            )
            .await;
        })
        .await;

        let (_session, mut events) = TransportSession::open(&config(url), "abc123")
            .await
            .expect("open");

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::State(ConnectionState::Open))
        );
        match events.recv().await {
            Some(TransportEvent::Envelope(env)) => {
                assert_eq!(env.content, "How long?");
                assert_eq!(env.sender, Some(crate::transport::Sender::Assistant));
                assert!(env.timestamp.is_some());
            }
            other => panic!("expected envelope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped_without_breaking_order() {
        let url = ws_server(|ws| async move {
            let (mut sink, _stream) = ws.split();
            send_text(&mut sink, r#"{"type": "message", "content": "first"}"#).await;
            send_text(&mut sink, "not json at all").await;
            send_text(&mut sink, r#"{"type": "message", "content": "second"}"#).await;
        })
        .await;

        let (_session, mut events) = TransportSession::open(&config(url), "abc123")
            .await
            .expect("open");

        let mut contents = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Envelope(env) => contents.push(env.content),
                TransportEvent::State(s) if s.is_terminal() => break,
                TransportEvent::State(_) => {}
            }
        }
        assert_eq!(contents, ["first", "second"]);
    }

    #[tokio::test]
    async fn send_transmits_the_exact_wire_shape() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();

        let url = ws_server(move |ws| async move {
            let (_sink, mut stream) = ws.split();
            while let Some(Ok(message)) = stream.next().await {
                if let tungstenite::Message::Text(text) = message {
                    let _ = seen_tx.send(text);
                }
            }
        })
        .await;

        let (session, _events) = TransportSession::open(&config(url), "abc123")
            .await
            .expect("open");

        session
            .send(&Envelope::message("I have a fever"))
            .expect("send");

        let raw = seen_rx.recv().await.expect("server saw a frame");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(
            value,
            serde_json::json!({"type": "message", "content": "I have a fever"})
        );
    }

    #[tokio::test]
    async fn remote_close_is_terminal_and_rejects_send() {
        let url = ws_server(|ws| async move {
            // Close immediately after the handshake.
            drop(ws);
        })
        .await;

        let (session, mut events) = TransportSession::open(&config(url), "abc123")
            .await
            .expect("open");

        // Drain until the terminal state shows up.
        loop {
            match events.recv().await {
                Some(TransportEvent::State(s)) if s.is_terminal() => break,
                Some(_) => {}
                None => panic!("event channel closed without a terminal state"),
            }
        }

        assert!(session.state().is_terminal());
        assert!(matches!(
            session.send(&Envelope::message("too late")),
            Err(TransportError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let url = ws_server(|ws| async move {
            let (_sink, mut stream) = ws.split();
            while stream.next().await.is_some() {}
        })
        .await;

        let (session, mut events) = TransportSession::open(&config(url), "abc123")
            .await
            .expect("open");

        session.close();
        session.close();

        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(matches!(
            session.send(&Envelope::message("nope")),
            Err(TransportError::NotOpen)
        ));

        // Exactly one Closed transition is emitted.
        let mut closed_events = 0;
        while let Ok(event) = events.try_recv() {
            if event == TransportEvent::State(ConnectionState::Closed) {
                closed_events += 1;
            }
        }
        assert_eq!(closed_events, 1);
    }

    #[tokio::test]
    async fn connect_failure_surfaces_as_connect_error() {
        // Port 1 is never listening.
        let result = TransportSession::open(&config("ws://127.0.0.1:1".into()), "abc123").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
