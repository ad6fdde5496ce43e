use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::{TransferError, TransferResult};

/// Streaming SHA-1 over the bytes of one transfer.
///
/// Byte count and digest are fed by the same call, so they always describe
/// the same data.
#[derive(Debug, Clone, Default)]
pub struct StreamDigest {
    hasher: Sha1,
    size: u64,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for `data`, which must be exactly the bytes moved.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.size += data.len() as u64;
    }

    pub fn finish(self) -> TransferResult {
        TransferResult {
            size: self.size,
            digest: hex::encode(self.hasher.finalize()),
        }
    }
}

/// Computes SHA-1 of `data` and returns the hex-encoded digest.
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Computes SHA-1 of an entire file and returns the hex-encoded digest.
pub fn digest_file(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut digest = StreamDigest::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finish().digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn known_sha1_vector() {
        assert_eq!(
            digest_bytes(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn digest_is_40_hex_chars() {
        let d = digest_bytes(b"hello world");
        assert_eq!(d.len(), 40);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut stream = StreamDigest::new();
        for piece in data.chunks(16383) {
            stream.update(piece);
        }
        let result = stream.finish();
        assert_eq!(result.size, data.len() as u64);
        assert_eq!(result.digest, digest_bytes(&data));
    }

    #[test]
    fn empty_stream_has_zero_size() {
        let result = StreamDigest::new().finish();
        assert_eq!(result.size, 0);
        assert_eq!(result.digest, digest_bytes(b""));
    }

    #[test]
    fn file_digest_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");
        let data = b"test content for checksum";
        std::fs::File::create(&path).unwrap().write_all(data).unwrap();
        assert_eq!(digest_file(&path).unwrap(), digest_bytes(data));
    }
}
