//! HTTP transport for control-plane calls.

use std::time::Duration;

use qmanager_protocol::constants::{Method, RPC_PATH};
use qmanager_protocol::{
    DownloadTicket, ProtocolError, ServerInfo, SessionId, TransferVerdict, UploadTicket,
    decode_optional,
};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::ClientError;
use crate::xmlrpc;

/// QManager control-plane client.
#[derive(Debug, Clone)]
pub struct QmClient {
    http: reqwest::Client,
    url: String,
}

impl QmClient {
    /// Creates a client for `http://<server>:<port>/RPC2`.
    ///
    /// `timeout` bounds each whole call. `None` waits as long as the
    /// service takes.
    pub fn new(server: &str, port: u16, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            url: format!("http://{server}:{port}{RPC_PATH}"),
        })
    }

    /// Sets a custom endpoint URL (for testing).
    #[cfg(test)]
    pub(crate) fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs one XML-RPC call and returns the raw result.
    pub async fn call(&self, method: Method, params: &[Value]) -> Result<Value, ClientError> {
        debug!(%method, url = %self.url, "rpc call");
        let body = xmlrpc::encode_call(method.as_str(), params);
        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        let value = xmlrpc::decode_response(&text)?;
        trace!(%method, reply = %value, "rpc reply");
        Ok(value)
    }

    /// `get_server_info()`.
    pub async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        let reply = self.call(Method::GetServerInfo, &[]).await?;
        decode(reply)
    }

    /// `upload(user, name, str(size))`: the service starts listening.
    pub async fn upload(
        &self,
        user: &str,
        remote_name: &str,
        size: u64,
    ) -> Result<UploadTicket, ClientError> {
        let params: [Value; 3] = [user.into(), remote_name.into(), size.to_string().into()];
        let reply = self.call(Method::Upload, &params).await?;
        decode(reply)
    }

    /// `download(user, name)`. `None` if the service has no such file.
    pub async fn download(
        &self,
        user: &str,
        remote_name: &str,
    ) -> Result<Option<DownloadTicket>, ClientError> {
        let params: [Value; 2] = [user.into(), remote_name.into()];
        let reply = self.call(Method::Download, &params).await?;
        Ok(decode_optional(reply)?)
    }

    /// `get_transfer_results(id, digest)`: upload verdict, if ready.
    pub async fn get_transfer_results(
        &self,
        session_id: &SessionId,
        digest: &str,
    ) -> Result<Option<TransferVerdict>, ClientError> {
        let params: [Value; 2] = [session_id.as_value().clone(), digest.into()];
        let reply = self.call(Method::GetTransferResults, &params).await?;
        Ok(decode_optional(reply)?)
    }

    /// `transfer_results(id, digest, str(size))`: download verdict, if ready.
    pub async fn transfer_results(
        &self,
        session_id: &SessionId,
        digest: &str,
        size: u64,
    ) -> Result<Option<TransferVerdict>, ClientError> {
        let params: [Value; 3] = [
            session_id.as_value().clone(),
            digest.into(),
            size.to_string().into(),
        ];
        let reply = self.call(Method::TransferResults, &params).await?;
        Ok(decode_optional(reply)?)
    }

    /// `list_files(user)`.
    pub async fn list_files(&self, user: &str) -> Result<Vec<String>, ClientError> {
        let reply = self.call(Method::ListFiles, &[Value::from(user)]).await?;
        Ok(decode_optional(reply)?.unwrap_or_default())
    }
}

fn decode<T: serde::de::DeserializeOwned>(reply: Value) -> Result<T, ClientError> {
    serde_json::from_value(reply)
        .map_err(ProtocolError::from)
        .map_err(ClientError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qmanager_protocol::constants::DEFAULT_CONTROL_PORT;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Starts a mock HTTP server answering one request with `status` and
    /// `body`. The handle yields the request body it received.
    async fn mock_server(status: u16, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/RPC2");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;

            let resp = format!(
                "HTTP/1.1 {status} OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    /// Reads one request and returns its body.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + length {
                    return text[split + 4..].to_string();
                }
            }
        }
        String::new()
    }

    fn reply(value_xml: &str) -> String {
        format!(
            "<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n{value_xml}\n</param>\n</params>\n</methodResponse>\n"
        )
    }

    fn client(url: String) -> QmClient {
        QmClient::new("unused", 1, None).unwrap().with_url(url)
    }

    #[test]
    fn endpoint_url() {
        let client = QmClient::new("qm.example.net", DEFAULT_CONTROL_PORT, None).unwrap();
        assert_eq!(client.url(), "http://qm.example.net:8080/RPC2");
    }

    #[tokio::test]
    async fn upload_sends_size_as_string() {
        let body = reply(
            "<value><array><data><value><int>11</int></value><value><string>7001</string></value></data></array></value>",
        );
        let (url, handle) = mock_server(200, &body).await;

        let ticket = client(url).upload("alice", "shared/disk.img", 1_000_000).await.unwrap();
        assert_eq!(ticket.session_id, SessionId::new(11));
        assert_eq!(ticket.port, 7001);

        let request = handle.await.unwrap();
        assert!(request.contains("<methodName>upload</methodName>"));
        assert!(request.contains("<string>shared/disk.img</string>"));
        assert!(request.contains("<string>1000000</string>"));
    }

    #[tokio::test]
    async fn download_missing_file_is_none() {
        let (url, _handle) = mock_server(200, &reply("<value><boolean>0</boolean></value>")).await;
        let ticket = client(url).download("alice", "gone.img").await.unwrap();
        assert!(ticket.is_none());
    }

    #[tokio::test]
    async fn download_ticket_decoded() {
        let body = reply(
            "<value><struct>\
             <member><name>fetch_id</name><value><int>5</int></value></member>\
             <member><name>server_port</name><value><int>7002</int></value></member>\
             <member><name>file_size</name><value><string>4096</string></value></member>\
             </struct></value>",
        );
        let (url, _handle) = mock_server(200, &body).await;
        let ticket = client(url).download("alice", "disk.img").await.unwrap().unwrap();
        assert_eq!(ticket.port, 7002);
        assert_eq!(ticket.file_size, 4096);
    }

    #[tokio::test]
    async fn pending_verdict_is_none() {
        let (url, handle) = mock_server(200, &reply("<value><string></string></value>")).await;
        let verdict = client(url)
            .transfer_results(&SessionId::new("f-9"), "abc", 12)
            .await
            .unwrap();
        assert!(verdict.is_none());

        let request = handle.await.unwrap();
        assert!(request.contains("<methodName>transfer_results</methodName>"));
        assert!(request.contains("<string>f-9</string>"));
        assert!(request.contains("<string>12</string>"));
    }

    #[tokio::test]
    async fn failed_verdict_decoded() {
        let body = reply(
            "<value><array><data><value><boolean>0</boolean></value>\
             <value><string>hash mismatch</string></value></data></array></value>",
        );
        let (url, _handle) = mock_server(200, &body).await;
        let verdict = client(url)
            .get_transfer_results(&SessionId::new(1), "abc")
            .await
            .unwrap()
            .unwrap();
        assert!(!verdict.ok);
        assert_eq!(verdict.detail, "hash mismatch");
    }

    #[tokio::test]
    async fn server_info_reads_version() {
        let body = reply(
            "<value><struct><member><name>server_version</name><value><string>1.2.0</string></value></member>\
             <member><name>hostname</name><value><string>qm1</string></value></member></struct></value>",
        );
        let (url, _handle) = mock_server(200, &body).await;
        let info = client(url).server_info().await.unwrap();
        assert_eq!(info.server_version, "1.2.0");
        assert_eq!(info.extra["hostname"], "qm1");
    }

    #[tokio::test]
    async fn list_files_tolerates_empty_reply() {
        let (url, _handle) = mock_server(200, &reply("<value><array><data></data></array></value>")).await;
        assert!(client(url).list_files("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_error_status() {
        let (url, _handle) = mock_server(500, "boom").await;
        let err = client(url).server_info().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 500, ref body } if body == "boom"));
    }

    #[tokio::test]
    async fn fault_reply() {
        let body = "<?xml version='1.0'?><methodResponse><fault><value><struct>\
            <member><name>faultCode</name><value><int>2</int></value></member>\
            <member><name>faultString</name><value><string>unknown user</string></value></member>\
            </struct></value></fault></methodResponse>";
        let (url, _handle) = mock_server(200, body).await;
        let err = client(url).list_files("nobody").await.unwrap_err();
        assert!(matches!(err, ClientError::Fault { code: 2, .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = QmClient::new("127.0.0.1", port, Some(Duration::from_secs(5)))
            .unwrap()
            .server_info()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
    }
}
