//! Error types for the DeepDetect API client.
//!
//! # Design
//! Three failure classes reach the caller unchanged: configuration problems
//! detected before any I/O, transport failures from the HTTP layer, and
//! non-2xx responses from the server. Payload (de)serialization failures get
//! their own variants so callers can tell a broken server response from a
//! broken connection.

use thiserror::Error;

/// Errors returned by `DdClient` and its helpers.
#[derive(Debug, Error)]
pub enum DdError {
    /// The configured api version has no entry in the URL table.
    #[error("unknown api version: {0}")]
    UnknownApiVersion(String),

    /// Host, port and protocol don't form a usable base URL.
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),

    /// A return format outside `json`, `text`, `none`.
    #[error("invalid return format: {0}")]
    InvalidReturnFormat(String),

    /// Connection refused, DNS failure, timeout, or an unreadable body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a status outside 2xx.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be parsed as JSON.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl DdError {
    /// Status code carried by a protocol error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            DdError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for errors raised before a request is sent.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DdError::UnknownApiVersion(_) | DdError::InvalidBaseUrl(_) | DdError::InvalidReturnFormat(_)
        )
    }
}

impl From<ureq::Error> for DdError {
    fn from(err: ureq::Error) -> Self {
        DdError::Transport(err.to_string())
    }
}
