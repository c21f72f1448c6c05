//! Document handles: input sources, pdfium binding, scoped open/save.
//!
//! pdfium documents are never held across stages. Every component binds
//! pdfium, opens the document, does its work and drops both before returning,
//! so the backing resource is released on every exit path including `?`
//! early returns.

use crate::error::SegmentError;
use crate::pipeline::raster;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable pointing at a pdfium shared library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// A document to operate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PdfInput {
    /// PDF on disk.
    Path(PathBuf),
    /// PDF bytes in memory.
    Bytes(#[serde(with = "crate::state::b64")] Vec<u8>),
    /// Encoded raster images, one page each; assembled into a document on open.
    Images(#[serde(with = "crate::state::b64::list")] Vec<Vec<u8>>),
}

impl PdfInput {
    /// File stem used to derive output names, if the input is a path.
    pub fn stem(&self) -> Option<String> {
        match self {
            PdfInput::Path(p) => p.file_stem().map(|s| s.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    /// Short human-readable description for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            PdfInput::Path(p) => p.display().to_string(),
            PdfInput::Bytes(b) => format!("<{} bytes>", b.len()),
            PdfInput::Images(imgs) => format!("<{} images>", imgs.len()),
        }
    }
}

impl From<PathBuf> for PdfInput {
    fn from(p: PathBuf) -> Self {
        PdfInput::Path(p)
    }
}

impl From<&Path> for PdfInput {
    fn from(p: &Path) -> Self {
        PdfInput::Path(p.to_path_buf())
    }
}

impl From<&str> for PdfInput {
    fn from(p: &str) -> Self {
        PdfInput::Path(PathBuf::from(p))
    }
}

impl From<Vec<u8>> for PdfInput {
    fn from(b: Vec<u8>) -> Self {
        PdfInput::Bytes(b)
    }
}

impl From<&[u8]> for PdfInput {
    fn from(b: &[u8]) -> Self {
        PdfInput::Bytes(b.to_vec())
    }
}

/// Bind to a pdfium library.
///
/// Lookup order:
/// 1. `PDFIUM_LIB_PATH`: a library file, or a directory containing one
/// 2. the current directory
/// 3. the system library search path
pub fn bind_pdfium() -> Result<Pdfium, SegmentError> {
    let from_env = std::env::var(PDFIUM_LIB_PATH_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    let bindings = match from_env {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path))
        }
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| SegmentError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Open `input` as a pdfium document borrowing `pdfium`.
pub(crate) fn open<'a>(
    pdfium: &'a Pdfium,
    input: &'a PdfInput,
) -> Result<PdfDocument<'a>, SegmentError> {
    let corrupt = |e: PdfiumError| SegmentError::CorruptPdf {
        source_name: input.describe(),
        detail: format!("{:?}", e),
    };
    let document = match input {
        PdfInput::Path(path) => pdfium.load_pdf_from_file(path, None).map_err(corrupt)?,
        PdfInput::Bytes(bytes) => pdfium.load_pdf_from_byte_slice(bytes, None).map_err(corrupt)?,
        PdfInput::Images(images) => raster::assemble(pdfium, images)?,
    };
    debug!(
        "Opened {} ({} pages)",
        input.describe(),
        document.pages().len()
    );
    Ok(document)
}

/// Serialise an open document to bytes.
pub(crate) fn save(document: &PdfDocument<'_>, operation: &str) -> Result<Vec<u8>, SegmentError> {
    document
        .save_to_bytes()
        .map_err(|e| SegmentError::pdfium(operation, e))
}

/// Number of pages in an open document.
pub(crate) fn page_count(document: &PdfDocument<'_>) -> usize {
    document.pages().len() as usize
}

/// Open `input` just long enough to count its pages.
pub fn count_pages(input: &PdfInput) -> Result<usize, SegmentError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, input)?;
    Ok(page_count(&document))
}

/// Page sizes in points, `(width, height)`, as pdfium reports them.
pub fn page_sizes(input: &PdfInput) -> Result<Vec<(f32, f32)>, SegmentError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, input)?;
    Ok(document
        .pages()
        .iter()
        .map(|page| (page.width().value, page.height().value))
        .collect())
}

/// Number of page objects (paths, text, images) on each page.
///
/// Annotation adds objects, so this is how re-annotation shows up.
pub fn page_object_counts(input: &PdfInput) -> Result<Vec<usize>, SegmentError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, input)?;
    Ok(document
        .pages()
        .iter()
        .map(|page| page.objects().len() as usize)
        .collect())
}
