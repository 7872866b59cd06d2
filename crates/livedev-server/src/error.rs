//! Server error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Server at {url} is not reachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
