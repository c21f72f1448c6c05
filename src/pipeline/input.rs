//! Input resolution: validate a user-supplied document before any stage runs.
//!
//! Paths are checked for existence, read permission and the `%PDF` magic so
//! callers get a precise error instead of an opaque pdfium failure. Byte
//! buffers get the same magic check.

use crate::document::PdfInput;
use crate::error::SegmentError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Validate `input` and return it with any path made absolute.
pub fn resolve_input(input: PdfInput) -> Result<PdfInput, SegmentError> {
    match input {
        PdfInput::Path(path) => resolve_local(&path).map(PdfInput::Path),
        PdfInput::Bytes(bytes) => {
            check_magic(&bytes, Path::new("<memory>"))?;
            Ok(PdfInput::Bytes(bytes))
        }
        images @ PdfInput::Images(_) => Ok(images),
    }
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path: &Path) -> Result<PathBuf, SegmentError> {
    if !path.exists() {
        return Err(SegmentError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != PDF_MAGIC {
                return Err(SegmentError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SegmentError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(SegmentError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let resolved = path
        .canonicalize()
        .map_err(|e| SegmentError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!("Resolved local PDF: {}", resolved.display());
    Ok(resolved)
}

fn check_magic(bytes: &[u8], label: &Path) -> Result<(), SegmentError> {
    if bytes.len() >= 4 && &bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(SegmentError::NotAPdf {
            path: label.to_path_buf(),
            magic,
        });
    }
    Ok(())
}
