//! Error types for the edgequake-pdf-segment library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SegmentError`]: **Fatal**: the stage cannot complete (missing input,
//!   bad configuration, a page range the document cannot satisfy). Returned as
//!   `Err(SegmentError)` from every component and pipeline transition.
//!
//! * [`UnitError`]: **Non-fatal**: a single semantic unit could not be cut
//!   out of the document. Only produced under
//!   [`crate::config::FailurePolicy::SkipAndReport`]; stored in
//!   [`crate::state::PipelineState::unit_errors`] so callers can inspect
//!   partial success.
//!
//! Every fatal variant belongs to one [`ErrorKind`], which lets callers branch
//! on the category (retry an oracle failure, surface a validation error to
//! the user) without matching every variant.

use std::path::PathBuf;
use thiserror::Error;

/// Broad category of a [`SegmentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Bad input path, configuration, anchor, output name or stage order.
    Validation,
    /// Unsupported input, undecodable image, failed rasterisation.
    Conversion,
    /// Page range outside the document or inverted.
    Range,
    /// Oracle output does not honour the unit contract.
    Schema,
    /// I/O or pdfium failure while opening or writing a document.
    Resource,
    /// The external oracle failed or timed out.
    Oracle,
    /// Unexpected internal error.
    Internal,
}

/// All fatal errors returned by the edgequake-pdf-segment library.
#[derive(Debug, Error)]
pub enum SegmentError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Anchor name is not one of the four page corners.
    #[error("Invalid anchor '{value}': expected top-left, top-right, bottom-left or bottom-right")]
    InvalidAnchor { value: String },

    /// The marker circle would extend past the page edge.
    #[error(
        "Marker on page {page} does not fit inside the {width}x{height}pt page \
         (centre {cx:.1},{cy:.1}, radius {radius:.1})\nLower the margin fraction or the offset."
    )]
    MarkerOutOfBounds {
        page: usize,
        width: f32,
        height: f32,
        cx: f32,
        cy: f32,
        radius: f32,
    },

    /// Output file name does not carry the extension its content requires.
    #[error("Output path '{path}' must end in '.{expected}'")]
    InvalidOutputExtension { path: PathBuf, expected: String },

    /// A name is needed to derive output file names from an in-memory document.
    #[error("A document name must be provided when the input is not a file path")]
    MissingDocumentName,

    /// A pipeline transition was requested from the wrong stage.
    #[error("Cannot move pipeline from stage '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The rasteriser only accepts PDF paths or PDF bytes.
    #[error("Unsupported input type for rasterisation: {detail}")]
    UnsupportedInputType { detail: String },

    /// Image bytes handed to the document builder could not be decoded.
    #[error("Image {index} is malformed: {detail}")]
    MalformedImage { index: usize, detail: String },

    /// pdfium failed to render a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A rendered page could not be encoded to the requested image format.
    #[error("Image encoding failed for page {page}: {detail}")]
    ImageEncodingFailed { page: usize, detail: String },

    // ── Range errors ──────────────────────────────────────────────────────
    /// Requested 0-based page range is inverted or exceeds the document.
    #[error("Page range {start}..={end} is out of bounds (document has {page_count} pages)")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        page_count: usize,
    },

    /// Oracle page range violates `1 ≤ start ≤ end ≤ page count`.
    #[error(
        "Page range {start_page}-{end_page} is invalid for a {page_count}-page document \
         (pages are numbered from 1)"
    )]
    InvalidPageRange {
        start_page: usize,
        end_page: usize,
        page_count: usize,
    },

    // ── Schema errors ─────────────────────────────────────────────────────
    /// An oracle unit carries no page range.
    #[error("Unit {unit} does not define a page_range")]
    MissingPageRange { unit: usize },

    /// Oracle output could not be decoded into the caller's unit schema.
    #[error("Oracle output does not match the unit schema: {detail}")]
    MalformedOracleOutput { detail: String },

    /// Wraps a failure attributable to one oracle unit.
    #[error("Unit {unit} failed: {source}")]
    UnitFailed {
        unit: usize,
        #[source]
        source: Box<SegmentError>,
    },

    // ── Resource errors ───────────────────────────────────────────────────
    /// pdfium could not parse the document.
    #[error("PDF '{source_name}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { source_name: String, detail: String },

    /// A pdfium call on an open document failed.
    #[error("pdfium failed during {operation}: {detail}")]
    Pdfium { operation: String, detail: String },

    /// Could not read a file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot could not be (de)serialised.
    #[error("Snapshot serialisation failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory) or install\n\
libpdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Oracle errors ─────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The oracle returned an error after its own retries.
    #[error("Oracle call failed after {retries} retries: {message}")]
    OracleFailed { retries: u32, message: String },

    /// The oracle did not answer within the configured timeout.
    #[error("Oracle call timed out after {secs}s")]
    OracleTimeout { secs: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SegmentError {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use SegmentError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | NotAPdf { .. }
            | InvalidConfig(_)
            | InvalidAnchor { .. }
            | MarkerOutOfBounds { .. }
            | InvalidOutputExtension { .. }
            | MissingDocumentName
            | InvalidTransition { .. } => ErrorKind::Validation,
            UnsupportedInputType { .. }
            | MalformedImage { .. }
            | RasterisationFailed { .. }
            | ImageEncodingFailed { .. } => ErrorKind::Conversion,
            RangeOutOfBounds { .. } | InvalidPageRange { .. } => ErrorKind::Range,
            MissingPageRange { .. } | MalformedOracleOutput { .. } => ErrorKind::Schema,
            UnitFailed { source, .. } => source.kind(),
            CorruptPdf { .. }
            | Pdfium { .. }
            | ReadFailed { .. }
            | OutputWriteFailed { .. }
            | Snapshot(_)
            | PdfiumBindingFailed(_) => ErrorKind::Resource,
            ProviderNotConfigured { .. } | OracleFailed { .. } | OracleTimeout { .. } => {
                ErrorKind::Oracle
            }
            Internal(_) => ErrorKind::Internal,
        }
    }

    /// Attribute this error to an oracle unit (0-based position).
    pub(crate) fn for_unit(self, unit: usize) -> Self {
        match self {
            already @ SegmentError::UnitFailed { .. } => already,
            other => SegmentError::UnitFailed {
                unit,
                source: Box::new(other),
            },
        }
    }

    /// Wrap a pdfium error raised while `operation` was running.
    pub(crate) fn pdfium(operation: impl Into<String>, err: impl std::fmt::Debug) -> Self {
        SegmentError::Pdfium {
            operation: operation.into(),
            detail: format!("{:?}", err),
        }
    }
}

/// A non-fatal error for a single semantic unit.
///
/// Stored in [`crate::state::PipelineState::unit_errors`] when the pipeline
/// runs with [`crate::config::FailurePolicy::SkipAndReport`].
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
#[error("Unit {unit}: {kind:?} error: {detail}")]
pub struct UnitError {
    /// 0-based position of the unit in the oracle's output.
    pub unit: usize,
    pub kind: ErrorKind,
    pub detail: String,
}

impl UnitError {
    pub(crate) fn from_error(unit: usize, err: &SegmentError) -> Self {
        let detail = match err {
            SegmentError::UnitFailed { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        Self {
            unit,
            kind: err.kind(),
            detail,
        }
    }
}
