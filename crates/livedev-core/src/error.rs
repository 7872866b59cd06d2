//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] livedev_storage::StorageError),

    #[error("Session error: {0}")]
    Session(#[from] livedev_session::SessionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] livedev_protocol::ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event pump already running")]
    AlreadyRunning,
}
