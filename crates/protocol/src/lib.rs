//! QManager control-plane protocol.
//!
//! Typed views of the replies returned by the QManager service's RPC
//! interface, plus the constants shared by the client, the data channel
//! and the session orchestrator.
//!
//! Replies travel as loosely typed values (the service is dynamically
//! typed: ports and sizes may arrive as integers or strings, "no result yet"
//! may be any falsy value). Everything here decodes from
//! [`serde_json::Value`] so the transport codec stays independent.

pub mod constants;
pub mod messages;
pub mod types;
pub mod version;

pub use messages::{DownloadTicket, ServerInfo, TransferVerdict, UploadTicket, decode_optional};
pub use types::{Direction, SessionId, StorageScope};
pub use version::ServerVersion;

/// Errors produced while interpreting control-plane payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed reply: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid remote file name: {0}")]
    InvalidName(String),
}
