//! Transport abstraction
//!
//! A transport moves raw text frames between the editor and any number of
//! browser pages. It reports new connections, inbound frames and closed
//! connections as [`TransportEvent`]s on the channel given to `start`.

use tokio::sync::mpsc;

use crate::message::ClientId;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A page finished loading and announced the URL it was loaded from
    Connect { client: ClientId, url: String },
    Message { client: ClientId, text: String },
    Close { client: ClientId },
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

pub fn event_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

pub trait Transport: Send + Sync {
    /// Begin delivering events. Called once when the transport is installed.
    fn start(&self, events: TransportEventSender) -> Result<()>;

    /// Send one frame to each of `clients`. Unknown ids are skipped.
    fn send(&self, clients: &[ClientId], text: &str) -> Result<()>;

    /// Drop a connection from the editor side
    fn close(&self, client: ClientId);

    /// Script the page must load to open a connection back to this transport
    fn remote_script(&self) -> Option<String>;
}
