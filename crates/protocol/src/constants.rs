//! Protocol constants and control-plane method names.

use std::time::Duration;

/// Local read/write chunk size for the data channel.
///
/// Not part of the wire contract: both endpoints may use different sizes.
pub const CHUNK_SIZE: usize = 16383;

/// Remote name prefix selecting the shared storage area.
pub const SHARED_PREFIX: &str = "shared/";

/// Default HTTP port of the control-plane service.
pub const DEFAULT_CONTROL_PORT: u16 = 8080;

/// Path of the XML-RPC endpoint on the control-plane service.
pub const RPC_PATH: &str = "/RPC2";

/// First server version able to serve downloads.
pub const DOWNLOAD_MIN_VERSION: &str = "1.0.4";

/// Delay between two confirmation polls that returned no verdict.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Timeout for the data-channel connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of leading bytes inspected for compression signatures.
pub const SIGNATURE_PROBE_LEN: usize = 1024;

/// Control-plane RPC methods used by the transfer core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GetServerInfo,
    Upload,
    Download,
    GetTransferResults,
    TransferResults,
    ListFiles,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::GetServerInfo => "get_server_info",
            Method::Upload => "upload",
            Method::Download => "download",
            Method::GetTransferResults => "get_transfer_results",
            Method::TransferResults => "transfer_results",
            Method::ListFiles => "list_files",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
