//! Data types for transfer sessions.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use qmanager_data_channel::RetryPolicy;
use qmanager_protocol::constants::{CONNECT_TIMEOUT, POLL_INTERVAL};
use qmanager_protocol::{Direction, SessionId, StorageScope};
use qmanager_transfer::{DEFAULT_UNITS, TransferResult};

/// Settings for a [`TransferOrchestrator`](crate::TransferOrchestrator).
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Host the data channel connects to (the QManager server).
    pub server_host: String,
    pub connect_timeout: Option<Duration>,
    /// Pause after each confirmation poll that returned no verdict.
    pub poll_interval: Duration,
    /// Give up after this many polls. `None` polls until the service answers.
    pub max_polls: Option<u32>,
    pub retry: RetryPolicy,
    /// Longest silence tolerated while receiving a download.
    pub read_timeout: Option<Duration>,
    /// Staging directory for downloads. Defaults to the destination's.
    pub temp_dir: Option<PathBuf>,
    /// Gzip uploads that are not already compressed.
    pub compress: bool,
    /// No progress bar.
    pub quiet: bool,
    pub progress_units: u32,
}

impl TransferConfig {
    pub fn new(server_host: impl Into<String>) -> Self {
        Self {
            server_host: server_host.into(),
            ..Self::default()
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            server_host: "localhost".into(),
            connect_timeout: Some(CONNECT_TIMEOUT),
            poll_interval: POLL_INTERVAL,
            max_polls: None,
            retry: RetryPolicy::default(),
            read_timeout: None,
            temp_dir: None,
            compress: false,
            quiet: false,
            progress_units: DEFAULT_UNITS,
        }
    }
}

/// Where a session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Negotiating,
    Transferring,
    Confirming,
    Succeeded,
    Failed,
}

impl SessionPhase {
    pub fn status(self) -> SessionStatus {
        match self {
            SessionPhase::Succeeded => SessionStatus::Succeeded,
            SessionPhase::Failed => SessionStatus::Failed,
            _ => SessionStatus::Pending,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Negotiating => "negotiating",
            SessionPhase::Transferring => "transferring",
            SessionPhase::Confirming => "confirming",
            SessionPhase::Succeeded => "succeeded",
            SessionPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One upload or download, from negotiation to verdict.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub direction: Direction,
    pub scope: StorageScope,
    /// Local file actually put on (or taken off) the wire.
    pub local_path: PathBuf,
    /// Name the service knows the file by, once negotiated.
    pub remote_name: Option<String>,
    pub session_id: Option<SessionId>,
    /// Data channel port; valid for this session only.
    pub port: Option<u16>,
    /// Announced by the service for downloads, measured for uploads.
    pub expected_size: Option<u64>,
    pub result: Option<TransferResult>,
    pub phase: SessionPhase,
    /// Confirmation polls issued so far.
    pub polls: u32,
}

impl TransferSession {
    pub fn new(direction: Direction, local_path: &Path, scope: StorageScope) -> Self {
        Self {
            direction,
            scope,
            local_path: local_path.to_path_buf(),
            remote_name: None,
            session_id: None,
            port: None,
            expected_size: None,
            result: None,
            phase: SessionPhase::Negotiating,
            polls: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.phase.status()
    }
}

/// Lifecycle event emitted while sessions run.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// A session entered a new phase.
    Phase {
        direction: Direction,
        file: String,
        phase: SessionPhase,
    },
    /// A confirmation poll is about to be issued.
    Polling {
        direction: Direction,
        file: String,
        attempt: u32,
    },
    /// The service confirmed the transfer.
    Completed {
        direction: Direction,
        file: String,
        result: TransferResult,
    },
    /// The session ended with an error.
    Failed {
        direction: Direction,
        file: String,
        phase: SessionPhase,
        error: String,
    },
}
