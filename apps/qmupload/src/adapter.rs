//! Adapter bridging `QmClient` to the session crate's `ControlPlane` trait.

use qmanager_client::{ClientError, QmClient};
use qmanager_protocol::{DownloadTicket, ServerInfo, SessionId, TransferVerdict, UploadTicket};
use qmanager_session::{ControlFuture, ControlPlane, SessionError};

/// Implements `ControlPlane` by delegating to the XML-RPC client.
pub struct ClientAdapter {
    client: QmClient,
}

impl ClientAdapter {
    pub fn new(client: QmClient) -> Self {
        Self { client }
    }
}

fn control_error(e: ClientError) -> SessionError {
    SessionError::ControlPlane(e.to_string())
}

impl ControlPlane for ClientAdapter {
    fn server_info(&self) -> ControlFuture<'_, ServerInfo> {
        Box::pin(async move { self.client.server_info().await.map_err(control_error) })
    }

    fn prepare_upload<'a>(
        &'a self,
        user: &'a str,
        remote_name: &'a str,
        size: u64,
    ) -> ControlFuture<'a, UploadTicket> {
        Box::pin(async move {
            self.client
                .upload(user, remote_name, size)
                .await
                .map_err(control_error)
        })
    }

    fn prepare_download<'a>(
        &'a self,
        user: &'a str,
        remote_name: &'a str,
    ) -> ControlFuture<'a, Option<DownloadTicket>> {
        Box::pin(async move {
            self.client
                .download(user, remote_name)
                .await
                .map_err(control_error)
        })
    }

    fn poll_upload_result<'a>(
        &'a self,
        session_id: &'a SessionId,
        digest: &'a str,
    ) -> ControlFuture<'a, Option<TransferVerdict>> {
        Box::pin(async move {
            self.client
                .get_transfer_results(session_id, digest)
                .await
                .map_err(control_error)
        })
    }

    fn poll_download_result<'a>(
        &'a self,
        session_id: &'a SessionId,
        digest: &'a str,
        size: u64,
    ) -> ControlFuture<'a, Option<TransferVerdict>> {
        Box::pin(async move {
            self.client
                .transfer_results(session_id, digest, size)
                .await
                .map_err(control_error)
        })
    }

    fn list_files<'a>(&'a self, user: &'a str) -> ControlFuture<'a, Vec<String>> {
        Box::pin(async move { self.client.list_files(user).await.map_err(control_error) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn client_failures_become_control_plane_errors() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = QmClient::new("127.0.0.1", port, Some(Duration::from_secs(5))).unwrap();
        let adapter = ClientAdapter::new(client);
        let err = adapter.list_files("alice").await.unwrap_err();
        assert!(matches!(err, SessionError::ControlPlane(_)), "{err}");
    }
}
