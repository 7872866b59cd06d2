//! WebSocket transport
//!
//! Listens on a local TCP port. Each page opens a socket and sends a
//! `{"type":"connect","url":...}` frame once loaded; from then on frames are
//! forwarded verbatim in both directions.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ProtocolError;
use crate::message::{ClientId, InboundMessage};
use crate::transport::{Transport, TransportEvent, TransportEventSender};
use crate::Result;

#[derive(Default)]
struct SocketState {
    listener: Option<TcpListener>,
    clients: HashMap<ClientId, mpsc::UnboundedSender<Message>>,
    next_client_id: ClientId,
    accept_task: Option<JoinHandle<()>>,
}

pub struct WebSocketTransport {
    local_addr: SocketAddr,
    state: Arc<Mutex<SocketState>>,
}

impl WebSocketTransport {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(addr = %local_addr, "Live development transport listening");

        Ok(Self {
            local_addr,
            state: Arc::new(Mutex::new(SocketState {
                listener: Some(listener),
                ..Default::default()
            })),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }
}

impl Transport for WebSocketTransport {
    fn start(&self, events: TransportEventSender) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;

        let mut state = self.state.lock();
        let listener = state.listener.take().ok_or(ProtocolError::AlreadyStarted)?;
        state.accept_task = Some(runtime.spawn(accept_loop(
            listener,
            Arc::clone(&self.state),
            events,
        )));

        Ok(())
    }

    fn send(&self, clients: &[ClientId], text: &str) -> Result<()> {
        let state = self.state.lock();
        for client in clients {
            match state.clients.get(client) {
                Some(tx) => {
                    if tx.send(Message::Text(text.to_string().into())).is_err() {
                        tracing::debug!(client, "Socket writer already gone");
                    }
                }
                None => tracing::debug!(client, "Skipping send to unknown client"),
            }
        }
        Ok(())
    }

    fn close(&self, client: ClientId) {
        if let Some(tx) = self.state.lock().clients.remove(&client) {
            let _ = tx.send(Message::Close(None));
        }
    }

    fn remote_script(&self) -> Option<String> {
        Some(format!(
            r#"<script>
(function () {{
    var socket = new WebSocket("ws://{addr}");
    window._LD_TRANSPORT = socket;
    socket.addEventListener("open", function () {{
        socket.send(JSON.stringify({{ type: "connect", url: window.location.href }}));
    }});
}}());
</script>
"#,
            addr = self.local_addr
        ))
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.state.lock().accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<Mutex<SocketState>>,
    events: TransportEventSender,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let client = {
                    let mut state = state.lock();
                    state.next_client_id += 1;
                    state.next_client_id
                };
                tracing::debug!(client, peer = %peer, "Accepted live development socket");
                tokio::spawn(serve_client(
                    client,
                    stream,
                    Arc::clone(&state),
                    events.clone(),
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept socket");
            }
        }

        if events.is_closed() {
            break;
        }
    }
}

async fn serve_client(
    client: ClientId,
    stream: TcpStream,
    state: Arc<Mutex<SocketState>>,
    events: TransportEventSender,
) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!(client, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.lock().clients.insert(client, tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let mut connected = false;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let text = text.to_string();
                let event = match connect_url(&text) {
                    Some(url) if !connected => {
                        connected = true;
                        TransportEvent::Connect { client, url }
                    }
                    _ => TransportEvent::Message { client, text },
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(client, error = %e, "Socket read failed");
                break;
            }
        }
    }

    state.lock().clients.remove(&client);
    writer.abort();

    if connected {
        let _ = events.send(TransportEvent::Close { client });
    }
}

fn connect_url(text: &str) -> Option<String> {
    match InboundMessage::decode(text) {
        Ok(InboundMessage::Connect { url }) => Some(url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::event_channel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connect_message_and_close() {
        let transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr();
        let (tx, mut rx) = event_channel();
        transport.start(tx).unwrap();

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();

        socket
            .send(Message::Text(
                r#"{"type":"connect","url":"http://localhost/index.html"}"#.into(),
            ))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let TransportEvent::Connect { client, url } = event else {
            panic!("expected connect, got {event:?}");
        };
        assert_eq!(url, "http://localhost/index.html");

        socket
            .send(Message::Text(r#"{"id":1,"result":{}}"#.into()))
            .await
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, TransportEvent::Message { client: c, .. } if c == client));

        transport
            .send(&[client], r#"{"id":2,"type":"Page.reload","ignoreCache":false}"#)
            .unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(frame.to_string().contains("Page.reload"));

        socket.close(None).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, TransportEvent::Close { client });
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let (tx, _rx) = event_channel();
        transport.start(tx.clone()).unwrap();
        assert!(matches!(
            transport.start(tx),
            Err(ProtocolError::AlreadyStarted)
        ));
        assert!(transport
            .remote_script()
            .unwrap()
            .contains(&transport.local_addr().to_string()));
    }
}
