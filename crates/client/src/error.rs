//! Client error types.

use qmanager_protocol::ProtocolError;

/// Errors from the control-plane client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed XML-RPC document: {0}")]
    Xml(String),

    #[error("remote fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("unexpected reply: {0}")]
    Decode(#[from] ProtocolError),
}
