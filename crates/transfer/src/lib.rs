//! Local building blocks for QManager image transfers.
//!
//! Everything in this crate is synchronous and socket-free: the block
//! progress bar, the streaming SHA-1 accumulator shared by both transfer
//! directions, the gzip preprocessor applied before uploads, and the
//! checks run on a local image before it is offered to the service.

mod compress;
mod digest;
mod progress;
mod types;
mod validation;

pub use compress::{
    EXEMPT_EXTENSION, StagedGzip, compress, compress_staged, detect_signature, is_compressed,
};
pub use digest::{StreamDigest, digest_bytes, digest_file};
pub use progress::{
    DEFAULT_UNITS, NoProgress, ProgressBar, ProgressError, ProgressSink, ProgressSummary,
};
pub use types::TransferResult;
pub use validation::{check_image_file, resolve_upload_source};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("file extension {ext} unsupported -- must be in: {supported} with optional compression ({compressed})")]
    UnsupportedExtension {
        ext: String,
        supported: String,
        compressed: String,
    },

    #[error("progress bar: {0}")]
    Progress(#[from] ProgressError),
}
