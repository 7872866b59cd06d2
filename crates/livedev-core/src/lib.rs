//! Live Development Core
//!
//! Wires storage, protocol, servers and the session together behind one
//! handle, and runs the loop that feeds browser and editor events to the
//! session one at a time.

mod config;
mod error;
mod live;

pub use config::{Config, DEFAULT_WEBSOCKET_PORT};
pub use error::CoreError;
pub use live::LiveDevelopment;

// Re-export core components
pub use livedev_documents::{
    DocumentChange, InMemoryDocument, Language, LiveDocument, SharedDocument, TextDocument,
};
pub use livedev_protocol::{
    LiveDevProtocol, LoopbackTransport, TextPosition, Transport, TransportEvent,
    WebSocketTransport,
};
pub use livedev_server::{LiveServer, ServerConfig, ServerManager, SharedServer};
pub use livedev_session::{
    CloseReason, Dialogs, HostEvent, Launcher, LiveStatus, SessionError, SessionManager,
    SessionOptions, SetupFailure, StatusChange, SystemLauncher, Workspace,
};
pub use livedev_storage::{Database, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
