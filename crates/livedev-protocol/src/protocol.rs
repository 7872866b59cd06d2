//! Connection registry and request/response correlation

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::ProtocolError;
use crate::message::{ClientId, InboundMessage, OutboundMessage, RelatedDocuments, TextPosition};
use crate::transport::{Transport, TransportEvent, TransportEventSender};
use crate::Result;

type Reply = std::result::Result<Value, Value>;

/// Typed notification for the session, produced from transport traffic
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    ConnectionConnect {
        client: ClientId,
        url: String,
    },
    ConnectionClose {
        client: ClientId,
    },
    DocumentRelated {
        client: ClientId,
        related: RelatedDocuments,
    },
    StylesheetAdded {
        client: ClientId,
        href: String,
        roots: Vec<String>,
    },
    StylesheetRemoved {
        client: ClientId,
        href: String,
    },
    ScriptAdded {
        client: ClientId,
        src: String,
    },
    ScriptRemoved {
        client: ClientId,
        src: String,
    },
}

/// Resolves with the first reply to a sent message
#[must_use = "dropping the handle discards the browser's reply"]
#[derive(Debug)]
pub struct ResponseHandle {
    id: u64,
    rx: Option<oneshot::Receiver<Reply>>,
}

impl ResponseHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the message actually reached at least one connection
    pub fn is_pending(&self) -> bool {
        self.rx.is_some()
    }

    pub async fn response(self) -> Result<Value> {
        let rx = self.rx.ok_or(ProtocolError::NoConnections)?;
        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(ProtocolError::Remote(error.to_string())),
            Err(_) => Err(ProtocolError::ResponseDropped),
        }
    }
}

struct ProtocolState {
    transport: Option<Arc<dyn Transport>>,
    connections: BTreeMap<ClientId, String>,
    next_msg_id: u64,
    pending: HashMap<u64, oneshot::Sender<Reply>>,
    remote_bootstrap: Option<String>,
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self {
            transport: None,
            connections: BTreeMap::new(),
            next_msg_id: 1,
            pending: HashMap::new(),
            remote_bootstrap: None,
        }
    }
}

impl ProtocolState {
    /// Forget `client`; requests nobody can answer or read any more go too
    fn remove_connection(&mut self, client: ClientId) -> Option<String> {
        let removed = self.connections.remove(&client);
        if self.connections.is_empty() {
            self.pending.clear();
        } else {
            self.pending.retain(|_, tx| !tx.is_closed());
        }
        removed
    }
}

/// Protocol endpoint shared by the session and the event pump
#[derive(Clone)]
pub struct LiveDevProtocol {
    state: Arc<RwLock<ProtocolState>>,
    events: TransportEventSender,
}

impl LiveDevProtocol {
    /// `events` is handed to every transport installed with `set_transport`
    pub fn new(events: TransportEventSender) -> Self {
        Self {
            state: Arc::new(RwLock::new(ProtocolState::default())),
            events,
        }
    }

    pub fn set_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        transport.start(self.events.clone())?;
        self.state.write().transport = Some(transport);
        tracing::debug!("Installed live development transport");
        Ok(())
    }

    pub fn has_transport(&self) -> bool {
        self.state.read().transport.is_some()
    }

    /// Extra markup appended after the transport's script, e.g. the page-side
    /// agent that answers protocol requests
    pub fn set_remote_bootstrap(&self, bootstrap: Option<String>) {
        self.state.write().remote_bootstrap = bootstrap;
    }

    /// Markup to inject into served HTML so the page connects back
    pub fn remote_script(&self) -> String {
        let (transport, bootstrap) = {
            let state = self.state.read();
            (state.transport.clone(), state.remote_bootstrap.clone())
        };

        let mut script = transport
            .and_then(|t| t.remote_script())
            .unwrap_or_default();
        if let Some(bootstrap) = bootstrap {
            script.push_str(&bootstrap);
        }
        script
    }

    pub fn connection_ids(&self) -> Vec<ClientId> {
        self.state.read().connections.keys().copied().collect()
    }

    pub fn connection_url(&self, client: ClientId) -> Option<String> {
        self.state.read().connections.get(&client).cloned()
    }

    fn register(&self, client: ClientId, url: String) -> ProtocolEvent {
        tracing::info!(client, url = %url, "Browser connected");
        self.state.write().connections.insert(client, url.clone());
        ProtocolEvent::ConnectionConnect { client, url }
    }

    fn deregister(&self, client: ClientId) -> Option<ProtocolEvent> {
        let removed = self.state.write().remove_connection(client);
        removed.map(|url| {
            tracing::info!(client, url = %url, "Browser disconnected");
            ProtocolEvent::ConnectionClose { client }
        })
    }

    fn resolve(&self, id: u64, reply: Reply) {
        match self.state.write().pending.remove(&id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => tracing::trace!(id, "Reply for unknown or already answered request"),
        }
    }

    /// Update the registry from one transport event and translate it
    pub fn handle_transport_event(&self, event: TransportEvent) -> Option<ProtocolEvent> {
        match event {
            TransportEvent::Connect { client, url } => Some(self.register(client, url)),
            TransportEvent::Close { client } => self.deregister(client),
            TransportEvent::Message { client, text } => self.handle_message(client, &text),
        }
    }

    fn handle_message(&self, client: ClientId, text: &str) -> Option<ProtocolEvent> {
        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(client, error = %e, "Dropping malformed browser message");
                return None;
            }
        };

        match message {
            InboundMessage::Reply { id, result } => {
                self.resolve(id, result);
                None
            }
            InboundMessage::Connect { url } => Some(self.register(client, url)),
            InboundMessage::Close => self.deregister(client),
            InboundMessage::DocumentRelated { related } => {
                Some(ProtocolEvent::DocumentRelated { client, related })
            }
            InboundMessage::StylesheetAdded { href, roots } => {
                Some(ProtocolEvent::StylesheetAdded {
                    client,
                    href,
                    roots,
                })
            }
            InboundMessage::StylesheetRemoved { href } => {
                Some(ProtocolEvent::StylesheetRemoved { client, href })
            }
            InboundMessage::ScriptAdded { src } => Some(ProtocolEvent::ScriptAdded { client, src }),
            InboundMessage::ScriptRemoved { src } => {
                Some(ProtocolEvent::ScriptRemoved { client, src })
            }
            InboundMessage::Unknown { kind } => {
                tracing::debug!(client, kind = %kind, "Ignoring unknown browser message");
                None
            }
        }
    }

    /// Send to `clients`, or to every connection when `None`
    pub fn send(
        &self,
        message: &OutboundMessage,
        clients: Option<&[ClientId]>,
    ) -> Result<ResponseHandle> {
        let (transport, targets, id, text, rx) = {
            let mut state = self.state.write();
            let transport = state.transport.clone().ok_or(ProtocolError::NoTransport)?;
            let targets: Vec<ClientId> = match clients {
                Some(ids) => ids.to_vec(),
                None => state.connections.keys().copied().collect(),
            };

            let id = state.next_msg_id;
            state.next_msg_id += 1;

            if targets.is_empty() {
                tracing::debug!(id, kind = message.kind(), "No connections, message not sent");
                return Ok(ResponseHandle { id, rx: None });
            }

            let text = message.encode(id)?;
            // Handles dropped by their callers will never be read
            state.pending.retain(|_, tx| !tx.is_closed());
            let (tx, rx) = oneshot::channel();
            state.pending.insert(id, tx);
            (transport, targets, id, text, rx)
        };

        tracing::debug!(id, kind = message.kind(), clients = targets.len(), "Sending protocol message");

        if let Err(e) = transport.send(&targets, &text) {
            self.state.write().pending.remove(&id);
            return Err(e);
        }

        Ok(ResponseHandle { id, rx: Some(rx) })
    }

    pub fn evaluate(&self, expression: impl Into<String>) -> Result<ResponseHandle> {
        self.send(
            &OutboundMessage::Evaluate {
                expression: expression.into(),
            },
            None,
        )
    }

    pub fn reload(&self, ignore_cache: bool) -> Result<ResponseHandle> {
        self.send(&OutboundMessage::Reload { ignore_cache }, None)
    }

    pub fn navigate(&self, url: impl Into<String>) -> Result<ResponseHandle> {
        self.send(&OutboundMessage::Navigate { url: url.into() }, None)
    }

    pub fn set_stylesheet_text(
        &self,
        url: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<ResponseHandle> {
        self.send(
            &OutboundMessage::SetStylesheetText {
                url: url.into(),
                text: text.into(),
            },
            None,
        )
    }

    pub fn get_stylesheet_text(&self, url: impl Into<String>) -> Result<ResponseHandle> {
        self.send(&OutboundMessage::GetStylesheetText { url: url.into() }, None)
    }

    pub fn set_document_text(
        &self,
        url: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<ResponseHandle> {
        self.send(
            &OutboundMessage::SetDocumentText {
                url: url.into(),
                text: text.into(),
            },
            None,
        )
    }

    pub fn apply_edit(
        &self,
        url: impl Into<String>,
        from: TextPosition,
        to: TextPosition,
        text: impl Into<String>,
    ) -> Result<ResponseHandle> {
        self.send(
            &OutboundMessage::ApplyEdit {
                url: url.into(),
                from,
                to,
                text: text.into(),
            },
            None,
        )
    }

    pub fn close(&self, client: ClientId) {
        let transport = {
            let mut state = self.state.write();
            state.remove_connection(client);
            state.transport.clone()
        };
        if let Some(transport) = transport {
            transport.close(client);
        }
    }

    /// Drop every connection; outstanding requests resolve as dropped
    pub fn close_all_connections(&self) {
        let (transport, clients) = {
            let mut state = self.state.write();
            let clients: Vec<ClientId> = state.connections.keys().copied().collect();
            state.connections.clear();
            state.pending.clear();
            (state.transport.clone(), clients)
        };

        if let Some(transport) = transport {
            for client in &clients {
                transport.close(*client);
            }
        }

        if !clients.is_empty() {
            tracing::info!(count = clients.len(), "Closed all browser connections");
        }
    }
}
