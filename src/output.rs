//! Writing pipeline results to disk.
//!
//! Layout for a document named `{stem}` in an output directory:
//!
//! ```text
//! {stem}_annotated.pdf
//! {stem}_annotated_pages/{stem}_page_{n}.{ext}
//! {stem}_extracted_{start0}_{end0}.pdf
//! ```
//!
//! `start0`/`end0` are the 0-based bounds the unit was cut with, i.e. the
//! circled numbers on its first and last page. Every file is written to a
//! temporary sibling first and renamed into place.

use crate::config::ImageFormat;
use crate::document::PdfInput;
use crate::error::SegmentError;
use crate::state::{ParsedUnit, PipelineState};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Paths written by [`write_outputs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputPaths {
    pub annotated: Option<PathBuf>,
    pub page_images: Vec<PathBuf>,
    pub units: Vec<PathBuf>,
}

/// Name used for output files: `name` if given, else the input file stem.
pub fn document_stem(input: &PdfInput, name: Option<&str>) -> Result<String, SegmentError> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => Ok(n.to_string()),
        None => input.stem().ok_or(SegmentError::MissingDocumentName),
    }
}

pub fn annotated_output_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}_annotated.pdf"))
}

pub fn annotated_pages_dir(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}_annotated_pages"))
}

pub fn page_image_name(stem: &str, n: usize, ext: &str) -> String {
    format!("{stem}_page_{n}.{ext}")
}

/// `{stem}_extracted_{start0}_{end0}.pdf`
pub fn extracted_file_name(stem: &str, start0: usize, end0: usize) -> String {
    format!("{stem}_extracted_{start0}_{end0}.pdf")
}

/// Write `bytes` to `path` via a temporary file and rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SegmentError> {
    let write_err = |e| SegmentError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn require_extension(path: &Path, expected: &str) -> Result<(), SegmentError> {
    let ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(expected));
    if !ok {
        return Err(SegmentError::InvalidOutputExtension {
            path: path.to_path_buf(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Write a PDF document. `path` must end in `.pdf`.
pub async fn save_pdf(path: &Path, bytes: &[u8]) -> Result<(), SegmentError> {
    require_extension(path, "pdf")?;
    write_atomic(path, bytes).await
}

/// Write page images as `{stem}_page_{n}.{ext}` in `dir`, numbering from
/// `start`.
pub async fn save_page_images(
    images: &[Vec<u8>],
    dir: &Path,
    stem: &str,
    format: ImageFormat,
    start: usize,
) -> Result<Vec<PathBuf>, SegmentError> {
    let mut paths = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        let path = dir.join(page_image_name(stem, start + i, format.extension()));
        write_atomic(&path, image).await?;
        paths.push(path);
    }
    Ok(paths)
}

/// Write each unit's sub-document as `{stem}_extracted_{start0}_{end0}.pdf`.
pub async fn save_parsed_units<U>(
    units: &[ParsedUnit<U>],
    dir: &Path,
    stem: &str,
) -> Result<Vec<PathBuf>, SegmentError> {
    let mut paths = Vec::with_capacity(units.len());
    for unit in units {
        let (start0, end0) = unit.page_range().zero_based();
        let path = dir.join(extracted_file_name(stem, start0, end0));
        save_pdf(&path, unit.pdf_bytes()).await?;
        paths.push(path);
    }
    Ok(paths)
}

/// Write everything the state holds so far into `dir`.
///
/// `name` overrides the output stem; it is required when the source is not
/// a file path.
pub async fn write_outputs<U>(
    state: &PipelineState<U>,
    dir: &Path,
    name: Option<&str>,
    format: ImageFormat,
    image_name_start: usize,
) -> Result<OutputPaths, SegmentError> {
    let stem = document_stem(state.source(), name)?;
    let mut out = OutputPaths::default();

    if let Some(annotated) = state.annotated() {
        let path = annotated_output_path(dir, &stem);
        save_pdf(&path, annotated).await?;
        out.annotated = Some(path);
    }
    if !state.page_images().is_empty() {
        out.page_images = save_page_images(
            state.page_images(),
            &annotated_pages_dir(dir, &stem),
            &stem,
            format,
            image_name_start,
        )
        .await?;
    }
    out.units = save_parsed_units(state.parsed(), dir, &stem).await?;

    info!(
        "Wrote outputs for '{}' to {} ({} images, {} units)",
        stem,
        dir.display(),
        out.page_images.len(),
        out.units.len()
    );
    Ok(out)
}

/// Persist a JSON snapshot of `state`. `path` must end in `.json`.
pub async fn save_snapshot<U: Serialize>(
    state: &PipelineState<U>,
    path: &Path,
) -> Result<(), SegmentError> {
    require_extension(path, "json")?;
    write_atomic(path, state.to_json()?.as_bytes()).await
}

/// Read a snapshot written by [`save_snapshot`].
pub async fn load_snapshot<U: DeserializeOwned>(
    path: &Path,
) -> Result<PipelineState<U>, SegmentError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SegmentError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    PipelineState::from_json(&json)
}
