//! Streams a local file into the data channel (upload side).

use std::path::Path;

use qmanager_protocol::constants::CHUNK_SIZE;
use qmanager_transfer::{ProgressSink, StreamDigest, TransferResult};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::DataChannelError;
use crate::retry::{RetryPolicy, is_transient};

/// Sends the whole content of `path` over `stream`.
///
/// The file is read in [`CHUNK_SIZE`] chunks; each chunk is hashed, then
/// written until the socket has accepted all of it. Progress is reported
/// in bytes the socket accepted. The stream is consumed: it is shut down
/// on success and dropped (closed) on every error path.
///
/// A file that yields no bytes is an [`DataChannelError::EmptyTransfer`].
pub async fn send_file<W>(
    path: &Path,
    mut stream: W,
    retry: &RetryPolicy,
    progress: &mut dyn ProgressSink,
) -> Result<TransferResult, DataChannelError>
where
    W: AsyncWrite + Unpin,
{
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut digest = StreamDigest::new();

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        digest.update(chunk);
        write_chunk(&mut stream, chunk, retry, progress).await?;
    }

    stream
        .shutdown()
        .await
        .map_err(|e| DataChannelError::transfer("closing data channel", e))?;
    drop(stream);

    let result = digest.finish();
    if result.size == 0 {
        return Err(DataChannelError::EmptyTransfer);
    }

    info!(path = %path.display(), size = result.size, digest = %result.digest, "file sent");
    Ok(result)
}

/// Writes `chunk` completely, re-issuing partial writes with the remainder.
async fn write_chunk<W>(
    stream: &mut W,
    chunk: &[u8],
    retry: &RetryPolicy,
    progress: &mut dyn ProgressSink,
) -> Result<(), DataChannelError>
where
    W: AsyncWrite + Unpin,
{
    let mut tracker = retry.tracker("sending data");
    let mut offset = 0;

    while offset < chunk.len() {
        match stream.write(&chunk[offset..]).await {
            Ok(0) => {
                return Err(DataChannelError::transfer(
                    "sending data",
                    std::io::Error::from(std::io::ErrorKind::WriteZero),
                ));
            }
            Ok(sent) => {
                offset += sent;
                progress.advance(sent as u64);
                tracker.reset();
                if offset < chunk.len() {
                    debug!(sent, remaining = chunk.len() - offset, "partial write");
                }
            }
            Err(e) if is_transient(&e) => tracker.wait(e).await?,
            Err(e) => return Err(DataChannelError::transfer("sending data", e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use qmanager_transfer::{NoProgress, digest_bytes};
    use tokio::io::AsyncReadExt;

    /// Writer that refuses with "would block" a scripted number of times,
    /// accepts at most `max_write` bytes per call, and can fail hard.
    struct ScriptedWriter {
        data: Vec<u8>,
        would_block: u32,
        max_write: usize,
        fail_with: Option<io::ErrorKind>,
        shut_down: bool,
    }

    impl ScriptedWriter {
        fn new(would_block: u32, max_write: usize) -> Self {
            Self {
                data: Vec::new(),
                would_block,
                max_write,
                fail_with: None,
                shut_down: false,
            }
        }
    }

    impl AsyncWrite for ScriptedWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            if let Some(kind) = this.fail_with {
                return Poll::Ready(Err(io::Error::from(kind)));
            }
            if this.would_block > 0 {
                this.would_block -= 1;
                return Poll::Ready(Err(io::Error::from(io::ErrorKind::WouldBlock)));
            }
            let n = buf.len().min(this.max_write);
            this.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.get_mut().shut_down = true;
            Poll::Ready(Ok(()))
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    fn source_file(dir: &Path, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join("disk.img");
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn sends_file_not_multiple_of_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let data = pattern(CHUNK_SIZE * 3 + 1234);
        let path = source_file(dir.path(), &data);

        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let collector = tokio::spawn(async move {
            let mut received = Vec::new();
            server.read_to_end(&mut received).await.unwrap();
            received
        });

        let result = send_file(&path, client, &RetryPolicy::default(), &mut NoProgress)
            .await
            .unwrap();
        let received = collector.await.unwrap();

        assert_eq!(result.size, data.len() as u64);
        assert_eq!(result.digest, digest_bytes(&data));
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn million_byte_file_reports_size_and_digest() {
        let dir = tempfile::tempdir().unwrap();
        let data = pattern(1_000_000);
        let path = source_file(dir.path(), &data);

        let mut writer = ScriptedWriter::new(0, usize::MAX);
        let result = send_file(&path, &mut writer, &RetryPolicy::default(), &mut NoProgress)
            .await
            .unwrap();

        assert_eq!(result.size, 1_000_000);
        assert_eq!(result.digest.len(), 40);
        assert_eq!(result.digest, digest_bytes(&data));
        assert!(writer.shut_down);
    }

    #[tokio::test]
    async fn would_block_is_retried_without_losing_data() {
        let dir = tempfile::tempdir().unwrap();
        let data = pattern(5000);
        let path = source_file(dir.path(), &data);

        let mut writer = ScriptedWriter::new(2, 1500);
        let mut progress: Vec<u64> = Vec::new();
        let result = send_file(&path, &mut writer, &RetryPolicy::default(), &mut progress)
            .await
            .unwrap();

        assert_eq!(result.size, 5000);
        assert_eq!(result.digest, digest_bytes(&data));
        assert_eq!(writer.data, data);
        // Progress follows what the socket accepted, not what was attempted.
        assert_eq!(progress, vec![1500, 1500, 1500, 500]);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let path = source_file(dir.path(), &pattern(100));

        let mut writer = ScriptedWriter::new(u32::MAX, usize::MAX);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        };
        let err = send_file(&path, &mut writer, &policy, &mut NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, DataChannelError::TransferIo { .. }), "{err}");
        assert!(!writer.shut_down);
    }

    #[tokio::test]
    async fn hard_write_error_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = source_file(dir.path(), &pattern(100));

        let mut writer = ScriptedWriter::new(0, usize::MAX);
        writer.fail_with = Some(io::ErrorKind::BrokenPipe);
        let err = send_file(&path, &mut writer, &RetryPolicy::default(), &mut NoProgress)
            .await
            .unwrap_err();
        match err {
            DataChannelError::TransferIo { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::BrokenPipe)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn zero_length_write_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = source_file(dir.path(), &pattern(10));

        let mut writer = ScriptedWriter::new(0, 0);
        let err = send_file(&path, &mut writer, &RetryPolicy::default(), &mut NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, DataChannelError::TransferIo { .. }));
    }

    #[tokio::test]
    async fn empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = source_file(dir.path(), b"");

        let mut writer = ScriptedWriter::new(0, usize::MAX);
        let err = send_file(&path, &mut writer, &RetryPolicy::default(), &mut NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, DataChannelError::EmptyTransfer));
        assert!(writer.shut_down, "socket closed even on empty transfer");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ScriptedWriter::new(0, usize::MAX);
        let err = send_file(
            &dir.path().join("absent.img"),
            &mut writer,
            &RetryPolicy::default(),
            &mut NoProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DataChannelError::Io(_)));
    }
}
