//! Receives a file from the data channel (download side).
//!
//! Bytes land in a temporary file next to the destination; the
//! destination only appears once the stream ended cleanly and the data
//! is on disk.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use qmanager_protocol::constants::CHUNK_SIZE;
use qmanager_transfer::{ProgressSink, StreamDigest, TransferResult};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::DataChannelError;
use crate::retry::{RetryPolicy, is_transient};

/// Knobs for [`receive_file`].
#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    /// Where the temporary file is created. Defaults to the destination's
    /// directory so the final rename stays on one filesystem.
    pub temp_dir: Option<PathBuf>,
    /// Maximum silence between two reads. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

/// Reads `stream` to its end and publishes the bytes at `dst`.
///
/// An existing `dst` is replaced atomically. On any failure, including an
/// empty stream, `dst` is left as it was and the temporary file is removed.
pub async fn receive_file<R>(
    mut stream: R,
    dst: &Path,
    options: &ReceiveOptions,
    progress: &mut dyn ProgressSink,
) -> Result<TransferResult, DataChannelError>
where
    R: AsyncRead + Unpin,
{
    let tmp_dir = temp_dir_for(dst, options);
    let tmp = tempfile::Builder::new()
        .prefix(".qm-")
        .suffix(".part")
        .tempfile_in(&tmp_dir)?;
    debug!(tmp = %tmp.path().display(), dst = %dst.display(), "receiving into temporary file");

    let mut file = tokio::fs::File::from_std(tmp.as_file().try_clone()?);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut digest = StreamDigest::new();
    let mut tracker = options.retry.tracker("receiving data");

    loop {
        let n = match read_chunk(&mut stream, &mut buf, options.read_timeout).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(ReadFailure::Timeout(after)) => return Err(DataChannelError::ReceiveTimeout(after)),
            Err(ReadFailure::Io(e)) if is_transient(&e) => {
                tracker.wait(e).await?;
                continue;
            }
            Err(ReadFailure::Io(e)) => {
                return Err(DataChannelError::transfer("receiving data", e));
            }
        };
        tracker.reset();

        let chunk = &buf[..n];
        digest.update(chunk);
        file.write_all(chunk).await?;
        progress.advance(n as u64);
    }
    drop(stream);

    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let result = digest.finish();
    if result.size == 0 {
        return Err(DataChannelError::EmptyTransfer);
    }

    publish(tmp, dst).await?;

    info!(path = %dst.display(), size = result.size, digest = %result.digest, "file received");
    Ok(result)
}

enum ReadFailure {
    Timeout(Duration),
    Io(io::Error),
}

async fn read_chunk<R>(
    stream: &mut R,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, ReadFailure>
where
    R: AsyncRead + Unpin,
{
    let read = match timeout {
        Some(limit) => tokio::time::timeout(limit, stream.read(buf))
            .await
            .map_err(|_| ReadFailure::Timeout(limit))?,
        None => stream.read(buf).await,
    };
    match read {
        Err(e) if e.kind() == io::ErrorKind::TimedOut => {
            Err(ReadFailure::Timeout(timeout.unwrap_or_default()))
        }
        other => other.map_err(ReadFailure::Io),
    }
}

fn temp_dir_for(dst: &Path, options: &ReceiveOptions) -> PathBuf {
    if let Some(dir) = &options.temp_dir {
        return dir.clone();
    }
    match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Moves the finished temporary file onto `dst`.
///
/// The rename happens on this task. Only the cross-device copy runs on the
/// blocking pool, and its output stays temporary until it is renamed here.
async fn publish(tmp: NamedTempFile, dst: &Path) -> Result<(), DataChannelError> {
    let tmp = match tmp.persist(dst) {
        Ok(_) => return Ok(()),
        Err(err) if err.error.kind() == io::ErrorKind::CrossesDevices => err.file,
        Err(err) => return Err(finalize(dst, err.error)),
    };
    warn!(dst = %dst.display(), "temporary directory on another filesystem, copying");

    let target = dst.to_path_buf();
    let staged = tokio::task::spawn_blocking(move || stage_copy(tmp.path(), &target))
        .await
        .map_err(|e| finalize(dst, io::Error::other(e)))??;
    staged.persist(dst).map_err(|e| finalize(dst, e.error))?;
    Ok(())
}

/// Copies `src` into a temporary file in `dst`'s directory.
fn stage_copy(src: &Path, dst: &Path) -> Result<NamedTempFile, DataChannelError> {
    let dir = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::Builder::new()
        .prefix(".qm-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| finalize(dst, e))?;
    let mut input = std::fs::File::open(src).map_err(|e| finalize(dst, e))?;
    io::copy(&mut input, staged.as_file_mut()).map_err(|e| finalize(dst, e))?;
    staged.as_file().sync_all().map_err(|e| finalize(dst, e))?;
    Ok(staged)
}

fn finalize(dst: &Path, source: io::Error) -> DataChannelError {
    DataChannelError::Finalize {
        path: dst.to_path_buf(),
        source,
    }
}
