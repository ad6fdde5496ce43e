//! qmupload configuration.
//!
//! Stored as JSON at `~/.config/qmanager/config.json`. Every field is
//! optional in the file; missing ones take the defaults below. Command-line
//! arguments override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use qmanager_protocol::constants::DEFAULT_CONTROL_PORT;
use qmanager_session::TransferConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "qmanager";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QmConfig {
    /// QManager server name or address.
    pub server: String,
    pub control_port: u16,
    pub connect_timeout_secs: u64,
    /// Bound on each control-plane call. `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_timeout_secs: Option<u64>,
    pub poll_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
    /// Staging directory for downloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// Gzip uploads that are not already compressed.
    pub compress: bool,
    pub progress_units: u32,
}

impl Default for QmConfig {
    fn default() -> Self {
        let transfer = TransferConfig::default();
        Self {
            server: DEFAULT_SERVER.into(),
            control_port: DEFAULT_CONTROL_PORT,
            connect_timeout_secs: transfer.connect_timeout.map_or(0, |t| t.as_secs()),
            rpc_timeout_secs: None,
            poll_interval_secs: transfer.poll_interval.as_secs(),
            max_polls: None,
            read_timeout_secs: None,
            temp_dir: None,
            compress: true,
            progress_units: transfer.progress_units,
        }
    }
}

impl QmConfig {
    /// Loads the configuration from `path`, or the default location.
    ///
    /// A missing file yields the defaults; an unreadable one is an error;
    /// an unparsable one is logged and ignored.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<QmConfig>(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "configuration loaded");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse configuration, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn rpc_timeout(&self) -> Option<Duration> {
        self.rpc_timeout_secs.map(Duration::from_secs)
    }

    /// Session settings for a transfer against `server`.
    pub fn transfer_config(&self, server: &str, quiet: bool) -> TransferConfig {
        TransferConfig {
            server_host: server.to_string(),
            connect_timeout: (self.connect_timeout_secs > 0)
                .then(|| Duration::from_secs(self.connect_timeout_secs)),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_polls: self.max_polls,
            read_timeout: self.read_timeout_secs.map(Duration::from_secs),
            temp_dir: self.temp_dir.clone(),
            compress: self.compress,
            quiet,
            progress_units: self.progress_units,
            ..TransferConfig::default()
        }
    }
}

fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("qmanager").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| anyhow::anyhow!("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(dir) = std::env::var("XDG_CONFIG_HOME")
            && !dir.is_empty()
        {
            return Ok(PathBuf::from(dir));
        }
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
        Ok(PathBuf::from(home).join(".config"))
    }
}
