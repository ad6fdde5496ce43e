use std::fmt;

/// Outcome of moving one file over the data channel.
///
/// `size` is the exact number of bytes that crossed the socket and
/// `digest` the lowercase hex SHA-1 of those same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub size: u64,
    pub digest: String,
}

impl fmt::Display for TransferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes, sha1 {}", self.size, self.digest)
    }
}
