//! TCP side channel for image transfers.
//!
//! After the control plane has negotiated a session, the file's bytes
//! travel over a dedicated TCP connection to the negotiated port. The
//! stream is raw: no framing, no length prefix, no embedded checksum.
//! Integrity is settled afterwards by comparing SHA-1 digests through
//! the control plane.
//!
//! - [`connector`] resolves the service host and opens the connection.
//! - [`sender`] streams a local file into the connection.
//! - [`receiver`] drains the connection into a temporary file and
//!   publishes it atomically.
//!
//! Sender and receiver are generic over tokio's `AsyncWrite`/`AsyncRead`
//! so they work on any stream, not only `TcpStream`.

pub mod connector;
pub mod error;
pub mod receiver;
pub mod retry;
pub mod sender;

pub use connector::connect;
pub use error::DataChannelError;
pub use receiver::{ReceiveOptions, receive_file};
pub use retry::RetryPolicy;
pub use sender::send_file;
