//! Live Development protocol
//!
//! The protocol layer translates session-level operations (reload, navigate,
//! evaluate, stylesheet updates) into JSON messages and sends them over a
//! [`Transport`] to every connected browser. Inbound traffic from the
//! transport is decoded into typed [`ProtocolEvent`]s for the session.
//!
//! Connections are keyed by opaque [`ClientId`]s handed out by the transport.

mod error;
mod loopback;
mod message;
mod protocol;
mod transport;
mod websocket;

pub use error::ProtocolError;
pub use loopback::{LoopbackTransport, SentFrame};
pub use message::{ClientId, InboundMessage, OutboundMessage, RelatedDocuments, TextPosition};
pub use protocol::{LiveDevProtocol, ProtocolEvent, ResponseHandle};
pub use transport::{
    event_channel, Transport, TransportEvent, TransportEventReceiver, TransportEventSender,
};
pub use websocket::WebSocketTransport;

pub type Result<T> = std::result::Result<T, ProtocolError>;
