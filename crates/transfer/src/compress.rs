//! Gzip preprocessing applied to images before upload.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use flate2::{Compression, GzBuilder};
use qmanager_protocol::constants::{CHUNK_SIZE, SIGNATURE_PROBE_LEN};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::TransferError;

/// Extension of files that are always sent as-is (ISO images).
pub const EXEMPT_EXTENSION: &str = "iso";

/// Suffix appended to files this module compresses.
const GZIP_SUFFIX: &str = ".gz";

/// Magic numbers of already-compressed containers.
const SIGNATURES: &[(&str, &[u8])] = &[
    ("zip", &[0x50, 0x4b, 0x03, 0x04]),
    ("gzip", &[0x1f, 0x8b, 0x08]),
    ("bzip2", &[0x42, 0x5a, 0x68]),
    ("xz", &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
];

/// Returns the name of the compressed format `head` starts with, if any.
pub fn detect_signature(head: &[u8]) -> Option<&'static str> {
    SIGNATURES
        .iter()
        .find(|(_, magic)| head.starts_with(magic))
        .map(|(name, _)| *name)
}

/// Returns true if `head` starts with a known compression signature.
pub fn is_compressed(head: &[u8]) -> bool {
    detect_signature(head).is_some()
}

/// Compresses `src` unless it is exempt or already compressed.
///
/// Returns the path to transfer: `src` itself, or a new sibling
/// `<src>.gz` whose gzip header carries the source's modification time.
/// The caller owns the new file and must delete it after the transfer.
pub fn compress(src: &Path) -> Result<PathBuf, TransferError> {
    match compress_staged(src)? {
        Some(staged) => staged.persist(),
        None => Ok(src.to_path_buf()),
    }
}

/// Gzip output not yet moved to its final `<src>.gz` name.
///
/// Dropping it deletes the staged file.
#[derive(Debug)]
pub struct StagedGzip {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedGzip {
    /// Where [`persist`](Self::persist) will put the file.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renames the staged file to `<src>.gz`, replacing any existing one.
    pub fn persist(self) -> Result<PathBuf, TransferError> {
        self.file
            .persist(&self.target)
            .map_err(|e| TransferError::Io(e.error))?;
        Ok(self.target)
    }
}

/// Like [`compress`], but leaves the output staged under a temporary name
/// next to `src`. `None` when the file is sent as-is.
pub fn compress_staged(src: &Path) -> Result<Option<StagedGzip>, TransferError> {
    if is_exempt(src) {
        debug!(path = %src.display(), "ISO image, sending uncompressed");
        return Ok(None);
    }

    let mut input = File::open(src)?;
    let mut head = Vec::with_capacity(SIGNATURE_PROBE_LEN);
    (&mut input)
        .take(SIGNATURE_PROBE_LEN as u64)
        .read_to_end(&mut head)?;
    if let Some(format) = detect_signature(&head) {
        debug!(path = %src.display(), format, "already compressed");
        return Ok(None);
    }

    let mtime = input
        .metadata()?
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    drop(input);

    let target = gzip_path(src);
    let dir = match src.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::Builder::new()
        .prefix(".qm-")
        .suffix(".gz.part")
        .tempfile_in(dir)?;
    info!(src = %src.display(), dst = %target.display(), "compressing image");

    write_gzip(src, file.as_file_mut(), mtime)?;
    Ok(Some(StagedGzip { file, target }))
}

fn is_exempt(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == EXEMPT_EXTENSION)
}

fn gzip_path(src: &Path) -> PathBuf {
    let mut name = OsString::from(src.as_os_str());
    name.push(GZIP_SUFFIX);
    PathBuf::from(name)
}

fn write_gzip(src: &Path, dst: &mut File, mtime: u64) -> io::Result<()> {
    let mut input = BufReader::with_capacity(CHUNK_SIZE, File::open(src)?);
    let output = BufWriter::new(dst);

    let mut builder = GzBuilder::new().mtime(u32::try_from(mtime).unwrap_or(0));
    if let Some(name) = src.file_name().and_then(|n| n.to_str()) {
        builder = builder.filename(name);
    }
    let mut encoder = builder.write(output, Compression::default());

    io::copy(&mut input, &mut encoder)?;
    let mut output = encoder.finish()?;
    io::Write::flush(&mut output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn create(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(data).unwrap();
        path
    }

    #[test]
    fn signatures_recognized() {
        assert_eq!(detect_signature(b"PK\x03\x04rest"), Some("zip"));
        assert_eq!(detect_signature(&[0x1f, 0x8b, 0x08, 0x00]), Some("gzip"));
        assert_eq!(detect_signature(b"BZh91AY"), Some("bzip2"));
        assert_eq!(
            detect_signature(&[0xfd, b'7', b'z', b'X', b'Z', 0x00, 0x00]),
            Some("xz")
        );
        assert!(!is_compressed(b"QFI\xfb"));
        assert!(!is_compressed(&[0x1f, 0x8b]));
        assert!(!is_compressed(b""));
    }

    #[test]
    fn already_compressed_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = create(dir.path(), "vm.img.bz2", b"BZh91AY&SY rest of stream");
        assert_eq!(compress(&path).unwrap(), path);
        assert!(!dir.path().join("vm.img.bz2.gz").exists());
    }

    #[test]
    fn iso_is_always_noop() {
        let dir = TempDir::new().unwrap();
        let path = create(dir.path(), "install.iso", &vec![0u8; 4096]);
        assert_eq!(compress(&path).unwrap(), path);
        assert!(!dir.path().join("install.iso.gz").exists());
    }

    #[test]
    fn iso_exemption_is_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let path = create(dir.path(), "BOOT.ISO", &vec![0u8; 4096]);
        assert_eq!(compress(&path).unwrap(), dir.path().join("BOOT.ISO.gz"));
    }

    #[test]
    fn staged_output_vanishes_unless_persisted() {
        let dir = TempDir::new().unwrap();
        let path = create(dir.path(), "disk.img", &vec![3u8; 20_000]);

        let staged = compress_staged(&path).unwrap().unwrap();
        assert_eq!(staged.target(), dir.path().join("disk.img.gz"));
        drop(staged);

        let left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![OsString::from("disk.img")]);
    }

    #[test]
    fn staged_output_replaces_stale_gzip() {
        let dir = TempDir::new().unwrap();
        let path = create(dir.path(), "disk.img", &vec![5u8; 8_000]);
        create(dir.path(), "disk.img.gz", b"stale");

        let out = compress_staged(&path).unwrap().unwrap().persist().unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(File::open(&out).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, vec![5u8; 8_000]);
    }

    #[test]
    fn iso_check_does_not_touch_file() {
        // The exemption is decided by name alone.
        let path = Path::new("/does/not/exist/boot.iso");
        assert_eq!(compress(path).unwrap(), path);
    }

    #[test]
    fn plain_image_is_gzipped() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 7) as u8).collect();
        let path = create(dir.path(), "qemu.img", &data);

        let out = compress(&path).unwrap();
        assert_eq!(out, dir.path().join("qemu.img.gz"));
        assert!(path.exists(), "source must be kept");

        let mut decoded = Vec::new();
        let mut decoder = GzDecoder::new(File::open(&out).unwrap());
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, data);

        let header = decoder.header().unwrap();
        assert_eq!(header.filename(), Some(&b"qemu.img"[..]));
        let src_mtime = std::fs::metadata(&path)
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as u32;
        assert_eq!(header.mtime(), src_mtime);
    }

    #[test]
    fn missing_source_errors() {
        let dir = TempDir::new().unwrap();
        let err = compress(&dir.path().join("absent.img")).unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }
}
