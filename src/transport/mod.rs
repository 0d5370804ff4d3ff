//! Transport layer — the wire format and the duplex WebSocket session.

pub mod envelope;
pub mod session;

pub use envelope::{Envelope, EnvelopeKind, Sender};
pub use session::{ConnectionState, TransportError, TransportEvent, TransportSession};
