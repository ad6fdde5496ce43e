//! Opens the data-channel connection to the negotiated port.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::DataChannelError;

/// Resolves `host` and connects one TCP stream to `port`.
///
/// IPv4 addresses are tried before IPv6 ones. `timeout` bounds the whole
/// attempt, resolution excluded. There is no retry here: a failed connect
/// ends the session.
pub async fn connect(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> Result<TcpStream, DataChannelError> {
    let addrs = resolve(host, port).await?;
    let label = format!("{host}:{port}");

    let stream = bounded(timeout, &label, connect_any(&addrs, &label)).await?;

    info!(addr = %label, "data channel connected");
    Ok(stream)
}

async fn bounded<F>(
    timeout: Option<Duration>,
    label: &str,
    attempt: F,
) -> Result<TcpStream, DataChannelError>
where
    F: Future<Output = Result<TcpStream, DataChannelError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| DataChannelError::ConnectTimeout {
                addr: label.to_string(),
            })?,
        None => attempt.await,
    }
}

async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, DataChannelError> {
    let resolution_error = |source: std::io::Error| DataChannelError::Resolution {
        host: host.to_string(),
        source,
    };

    let mut addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(resolution_error)?
        .collect();
    if addrs.is_empty() {
        return Err(resolution_error(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "host has no addresses",
        )));
    }

    // Stable sort: keeps resolver order within each family.
    addrs.sort_by_key(|a| !a.is_ipv4());
    debug!(host, ?addrs, "resolved data channel host");
    Ok(addrs)
}

async fn connect_any(addrs: &[SocketAddr], label: &str) -> Result<TcpStream, DataChannelError> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(DataChannelError::Connect {
        addr: label.to_string(),
        source: last_err.unwrap_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept = tokio::spawn(async move { listener.accept().await.map(|(_, addr)| addr) });
        let stream = connect("127.0.0.1", port, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        let peer = accept.await.unwrap().unwrap();
        assert_eq!(peer, stream.local_addr().unwrap());
    }

    #[tokio::test]
    async fn connects_without_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(connect("localhost", port, None).await.is_ok());
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect("127.0.0.1", port, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, DataChannelError::Connect { .. }), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_attempt_is_connect_timeout() {
        let err = bounded(
            Some(Duration::from_secs(30)),
            "qmanager:7001",
            std::future::pending(),
        )
        .await
        .unwrap_err();
        match err {
            DataChannelError::ConnectTimeout { addr } => assert_eq!(addr, "qmanager:7001"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unresolvable_host_is_resolution_error() {
        let err = connect("not a valid host name", 80, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, DataChannelError::Resolution { .. }), "{err}");
    }
}
