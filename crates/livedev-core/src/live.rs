//! Live development entry point
//!
//! `LiveDevelopment` owns everything a host needs: the database, the protocol
//! endpoint, the server providers and the session. Hosts forward editor
//! events into a channel and drive `run`; browser events arrive through the
//! installed transport.

use livedev_protocol::{
    event_channel, LiveDevProtocol, Transport, TransportEventReceiver, WebSocketTransport,
};
use livedev_server::ServerManager;
use livedev_session::{
    Dialogs, HostEvent, LiveStatus, SessionManager, StatusChange, Workspace,
};
use livedev_storage::Database;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::config::Config;
use crate::error::CoreError;
use crate::Result;

pub struct LiveDevelopment {
    config: Config,
    db: Database,
    protocol: LiveDevProtocol,
    servers: ServerManager,
    session: SessionManager,
    /// Taken by `run`
    transport_events: Mutex<Option<TransportEventReceiver>>,
}

impl LiveDevelopment {
    /// Open the configured database and set up a session
    pub fn new(
        config: Config,
        workspace: Arc<dyn Workspace>,
        dialogs: Arc<dyn Dialogs>,
    ) -> Result<Self> {
        // Ensure data directory exists
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&config.database_path)?;

        Self::with_database(config, db, workspace, dialogs)
    }

    pub fn with_database(
        config: Config,
        db: Database,
        workspace: Arc<dyn Workspace>,
        dialogs: Arc<dyn Dialogs>,
    ) -> Result<Self> {
        let (tx, rx) = event_channel();
        let protocol = LiveDevProtocol::new(tx);
        let servers = ServerManager::with_defaults();

        let session = SessionManager::new(
            protocol.clone(),
            servers.clone(),
            workspace,
            dialogs,
            db.clone(),
            config.session_options(),
        );
        session.init()?;

        tracing::info!(
            database = %config.database_path.display(),
            html_live_edit = config.html_live_edit,
            "Initialized live development"
        );

        Ok(Self {
            config,
            db,
            protocol,
            servers,
            session,
            transport_events: Mutex::new(Some(rx)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn protocol(&self) -> &LiveDevProtocol {
        &self.protocol
    }

    /// Providers consulted when a session needs a server
    pub fn server_manager(&self) -> &ServerManager {
        &self.servers
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn status(&self) -> LiveStatus {
        self.session.status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.session.subscribe()
    }

    pub fn set_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        self.session.set_transport(transport)?;
        Ok(())
    }

    /// Listen for pages on the configured address and use that transport
    pub async fn start_websocket(&self) -> Result<SocketAddr> {
        let transport = WebSocketTransport::bind(self.config.websocket_addr).await?;
        let addr = transport.local_addr();
        self.set_transport(Arc::new(transport))?;

        tracing::info!(addr = %addr, "Listening for live pages");
        Ok(addr)
    }

    pub async fn open(&self) -> Result<()> {
        self.session.open().await?;
        Ok(())
    }

    pub fn close(&self) {
        self.session.close();
    }

    /// Dispatch browser and editor events until the host channel closes,
    /// then close the session
    pub async fn run(&self, mut host_events: mpsc::UnboundedReceiver<HostEvent>) -> Result<()> {
        let mut guard = EventsGuard {
            slot: &self.transport_events,
            events: self.transport_events.lock().take(),
        };
        let Some(transport_events) = guard.events.as_mut() else {
            return Err(CoreError::AlreadyRunning);
        };

        // Status changes can move the connect deadline
        let mut statuses = self.session.subscribe();

        tracing::debug!("Live development event loop started");
        loop {
            let deadline = self.session.connect_deadline();

            tokio::select! {
                event = transport_events.recv() => match event {
                    Some(event) => self.session.handle_transport_event(event).await,
                    None => break,
                },
                event = host_events.recv() => match event {
                    Some(event) => self.session.handle_host_event(event),
                    None => break,
                },
                _ = wait_until(deadline) => {
                    self.session.check_connect_timeout(Instant::now());
                }
                change = statuses.recv() => {
                    if let Err(broadcast::error::RecvError::Closed) = change {
                        break;
                    }
                }
            }
        }

        self.session.close();
        tracing::debug!("Live development event loop stopped");
        Ok(())
    }
}

/// Puts the transport receiver back when `run` returns or is dropped
struct EventsGuard<'a> {
    slot: &'a Mutex<Option<TransportEventReceiver>>,
    events: Option<TransportEventReceiver>,
}

impl Drop for EventsGuard<'_> {
    fn drop(&mut self) {
        if let Some(events) = self.events.take() {
            *self.slot.lock() = Some(events);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
