//! Session error types.

use qmanager_data_channel::DataChannelError;
use qmanager_transfer::TransferError;

/// Errors that end a transfer session.
///
/// Local transport failures (`DataChannel`, `Transfer`) are kept apart from
/// rejections by the service (`RemoteVerification`, `FileNotFound`,
/// `Capability`).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unable to contact QManager: {0}")]
    Unreachable(String),

    #[error("control plane error: {0}")]
    ControlPlane(String),

    #[error("server version {found:?} does not support {feature} (requires {required} or later)")]
    Capability {
        feature: &'static str,
        found: String,
        required: &'static str,
    },

    #[error("{scope} file not found on QManager: {name}")]
    FileNotFound { scope: String, name: String },

    #[error("data channel: {0}")]
    DataChannel(#[from] DataChannelError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("QManager rejected the transfer: {0}")]
    RemoteVerification(String),

    #[error("no confirmation from QManager after {0} polls")]
    ConfirmTimeout(u32),

    #[error("cancelled")]
    Cancelled,
}

impl SessionError {
    /// True when the service answered and refused, as opposed to a local
    /// or transport failure.
    pub fn is_remote_rejection(&self) -> bool {
        matches!(
            self,
            SessionError::RemoteVerification(_)
                | SessionError::FileNotFound { .. }
                | SessionError::Capability { .. }
        )
    }
}
