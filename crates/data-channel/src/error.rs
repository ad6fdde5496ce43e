//! Error types for the data channel.

use std::path::PathBuf;
use std::time::Duration;

/// Errors produced by the TCP data channel.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    /// Local file I/O (opening the source, writing the temporary file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot resolve host {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out trying to connect to {addr}")]
    ConnectTimeout { addr: String },

    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket failure while moving data.
    #[error("error {context}: {source}")]
    TransferIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out waiting for data after {0:?}")]
    ReceiveTimeout(Duration),

    #[error("no data transferred")]
    EmptyTransfer,

    #[error("cannot publish {}: {source}", path.display())]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DataChannelError {
    pub(crate) fn transfer(context: impl Into<String>, source: std::io::Error) -> Self {
        DataChannelError::TransferIo {
            context: context.into(),
            source,
        }
    }
}
