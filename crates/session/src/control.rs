//! Control-plane abstraction.
//!
//! `ControlPlane` is implemented by the application on top of the RPC
//! client. Keeping it a trait decouples session logic from the transport
//! and makes it testable with scripted mocks.

use std::future::Future;
use std::pin::Pin;

use qmanager_protocol::{DownloadTicket, ServerInfo, SessionId, TransferVerdict, UploadTicket};

use crate::error::SessionError;

/// Boxed future returned by [`ControlPlane`] methods.
pub type ControlFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// Operations the session needs from the QManager service.
pub trait ControlPlane: Send + Sync {
    /// Fetches server information. Used as the reachability probe.
    fn server_info(&self) -> ControlFuture<'_, ServerInfo>;

    /// Asks the service to listen for an upload of `size` bytes.
    fn prepare_upload<'a>(
        &'a self,
        user: &'a str,
        remote_name: &'a str,
        size: u64,
    ) -> ControlFuture<'a, UploadTicket>;

    /// Asks the service to serve `remote_name`. `None` if it has no such file.
    fn prepare_download<'a>(
        &'a self,
        user: &'a str,
        remote_name: &'a str,
    ) -> ControlFuture<'a, Option<DownloadTicket>>;

    /// Asks for the upload verdict. `None` while the service is still checking.
    fn poll_upload_result<'a>(
        &'a self,
        session_id: &'a SessionId,
        digest: &'a str,
    ) -> ControlFuture<'a, Option<TransferVerdict>>;

    /// Reports what was received and asks for the download verdict.
    fn poll_download_result<'a>(
        &'a self,
        session_id: &'a SessionId,
        digest: &'a str,
        size: u64,
    ) -> ControlFuture<'a, Option<TransferVerdict>>;

    /// Lists the files stored for `user`.
    fn list_files<'a>(&'a self, user: &'a str) -> ControlFuture<'a, Vec<String>>;
}
