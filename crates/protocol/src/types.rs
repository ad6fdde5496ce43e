use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::SHARED_PREFIX;

/// Storage area a file belongs to on the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageScope {
    /// Visible only to the owning user.
    #[default]
    Private,
    /// Visible to every user.
    Shared,
}

impl StorageScope {
    pub fn from_shared(shared: bool) -> Self {
        if shared {
            StorageScope::Shared
        } else {
            StorageScope::Private
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StorageScope::Private => "private",
            StorageScope::Shared => "shared",
        }
    }

    /// Builds the name the service knows a local file by.
    ///
    /// Only the base name of `local_path` is used; shared files carry the
    /// `shared/` prefix. The prefix is interpreted by the service, never by
    /// the transfer core.
    pub fn remote_name(self, local_path: &Path) -> Result<String, ProtocolError> {
        let base = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProtocolError::InvalidName(local_path.display().to_string()))?;

        Ok(match self {
            StorageScope::Private => base.to_string(),
            StorageScope::Shared => format!("{SHARED_PREFIX}{base}"),
        })
    }
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a transfer session, seen from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

/// Server-issued transfer session identifier (`fetch_id`).
///
/// Opaque to the client: it is echoed back verbatim, with its original
/// type, in the confirmation polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(serde_json::Value);

impl SessionId {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self(value.into())
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}
