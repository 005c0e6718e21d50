//! Error type shared by every coordinator in the core.

use thiserror::Error;

/// Errors produced while talking to the processing backend or the log stream.
#[derive(Debug, Error)]
pub enum Error {
    /// The request never produced a response (connect, timeout, body read).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered `success: false`.
    #[error("backend rejected the request: {0}")]
    Rejected(String),

    /// A payload could not be decoded.
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// A local file could not be read for upload.
    #[error("cannot read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The log stream could not be opened or failed mid-flight.
    #[error("log stream error: {0}")]
    Stream(String),

    /// The base URL cannot be turned into an endpoint.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),

    /// The document is not in the current registry snapshot.
    #[error("unknown document: {0}")]
    UnknownDocument(String),

    /// The backend has not flagged the document as processable.
    #[error("document {0} cannot be processed in its current state")]
    NotProcessable(String),
}

impl Error {
    pub fn rejected(message: Option<String>) -> Self {
        Self::Rejected(message.unwrap_or_else(|| "no reason given".to_string()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
