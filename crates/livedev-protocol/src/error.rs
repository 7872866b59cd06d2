//! Protocol error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message is not a JSON object")]
    NotAnObject,

    #[error("Message has no type")]
    MissingType,

    #[error("Message {kind} is missing field {field}")]
    MissingField { kind: String, field: &'static str },

    #[error("No transport configured")]
    NoTransport,

    #[error("Transport has not been started")]
    NotStarted,

    #[error("Transport already started")]
    AlreadyStarted,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No browser connected")]
    NoConnections,

    #[error("Response channel closed before a reply arrived")]
    ResponseDropped,

    #[error("Browser returned an error: {0}")]
    Remote(String),
}
