//! In-process transport
//!
//! Records everything sent and lets the caller play the browser side.
//! Used by tests and by hosts that drive a page through their own channel.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ProtocolError;
use crate::message::ClientId;
use crate::transport::{Transport, TransportEvent, TransportEventSender};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub clients: Vec<ClientId>,
    pub text: String,
}

impl SentFrame {
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.text).ok()
    }
}

#[derive(Default)]
struct LoopbackState {
    events: Option<TransportEventSender>,
    sent: Vec<SentFrame>,
    closed: Vec<ClientId>,
    start_count: usize,
    remote_script: Option<String>,
}

#[derive(Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_script(script: impl Into<String>) -> Self {
        let transport = Self::new();
        transport.state.lock().remote_script = Some(script.into());
        transport
    }

    fn emit(&self, event: TransportEvent) -> Result<()> {
        let sender = self
            .state
            .lock()
            .events
            .clone()
            .ok_or(ProtocolError::NotStarted)?;
        sender
            .send(event)
            .map_err(|e| ProtocolError::Transport(e.to_string()))
    }

    pub fn connect(&self, client: ClientId, url: impl Into<String>) -> Result<()> {
        self.emit(TransportEvent::Connect {
            client,
            url: url.into(),
        })
    }

    pub fn receive(&self, client: ClientId, text: impl Into<String>) -> Result<()> {
        self.emit(TransportEvent::Message {
            client,
            text: text.into(),
        })
    }

    pub fn disconnect(&self, client: ClientId) -> Result<()> {
        self.emit(TransportEvent::Close { client })
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.state.lock().sent.clone()
    }

    pub fn take_sent(&self) -> Vec<SentFrame> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Parsed bodies of every frame sent so far
    pub fn sent_messages(&self) -> Vec<Value> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(SentFrame::json)
            .collect()
    }

    /// Frames whose `type` matches `kind`
    pub fn sent_of_type(&self, kind: &str) -> Vec<Value> {
        self.sent_messages()
            .into_iter()
            .filter(|msg| msg["type"] == kind)
            .collect()
    }

    pub fn closed_clients(&self) -> Vec<ClientId> {
        self.state.lock().closed.clone()
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().start_count
    }
}

impl Transport for LoopbackTransport {
    fn start(&self, events: TransportEventSender) -> Result<()> {
        let mut state = self.state.lock();
        state.events = Some(events);
        state.start_count += 1;
        Ok(())
    }

    fn send(&self, clients: &[ClientId], text: &str) -> Result<()> {
        self.state.lock().sent.push(SentFrame {
            clients: clients.to_vec(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn close(&self, client: ClientId) {
        self.state.lock().closed.push(client);
    }

    fn remote_script(&self) -> Option<String> {
        self.state.lock().remote_script.clone()
    }
}
