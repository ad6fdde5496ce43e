use std::path::{Path, PathBuf};

use crate::TransferError;

/// Image extensions the service accepts.
const SUPPORTED_EXTENSIONS: &[&str] = &["img", "qcow2", "iso"];

/// Compression suffixes allowed on top of a supported image extension.
const COMPRESSED_EXTENSIONS: &[&str] = &["gz", "bz2", "xz"];

/// Checks that `path` is a regular file with an extension the service accepts.
///
/// Accepted names look like `name.img`, `name.qcow2`, `name.iso`,
/// optionally followed by `.gz`, `.bz2` or `.xz`.
pub fn check_image_file(path: &Path) -> Result<(), TransferError> {
    if !path.is_file() {
        return Err(TransferError::InvalidPath(format!(
            "cannot find file: {}",
            path.display()
        )));
    }

    let mut ext = extension_of(path);
    if COMPRESSED_EXTENSIONS.contains(&ext.as_str())
        && let Some(stem) = path.file_stem()
    {
        ext = extension_of(Path::new(stem));
    }

    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(TransferError::UnsupportedExtension {
            ext: if ext.is_empty() {
                "(none)".into()
            } else {
                format!(".{ext}")
            },
            supported: dotted(SUPPORTED_EXTENSIONS),
            compressed: dotted(COMPRESSED_EXTENSIONS),
        });
    }

    Ok(())
}

/// Resolves the file to upload when the user names a directory.
///
/// A directory stands for the first `*.gz` file it contains (in name
/// order); any other path is returned unchanged.
pub fn resolve_upload_source(path: &Path) -> Result<PathBuf, TransferError> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "gz"))
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        TransferError::InvalidPath(format!("no .gz image found in {}", path.display()))
    })
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string()
}

fn dotted(exts: &[&str]) -> String {
    exts.iter()
        .map(|e| format!(".{e}"))
        .collect::<Vec<_>>()
        .join(", ")
}
