//! Session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No HTML file to preview")]
    NoHtmlFile,

    #[error("Server not ready: {0}")]
    ServerNotReady(String),

    #[error("Open superseded by a newer open or close")]
    Cancelled,

    #[error("Session has no server")]
    NoServer,

    #[error("Browser launch failed: {0}")]
    Launch(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] livedev_storage::StorageError),

    #[error("Document error: {0}")]
    Document(#[from] livedev_documents::DocumentError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] livedev_protocol::ProtocolError),

    #[error("Server error: {0}")]
    Server(#[from] livedev_server::ServerError),
}
