//! # edgequake-pdf-segment
//!
//! Split a PDF into semantically distinct sub-documents (one per question,
//! derivation, topic, …) with the help of a Vision Language Model.
//!
//! ## Why this crate?
//!
//! A VLM can read a scanned lecture and tell you where each derivation
//! starts and ends, but it cannot reliably count pages in a stack of
//! images. This crate stamps every page with a circled page index first, so
//! the model cites the number it sees. The reported ranges are then cut out
//! of the annotated document as standalone PDFs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Prepare  validate input, draw page markers, rasterise (spawn_blocking)
//!  ├─ 2. Consult  page images + prompt → oracle → ordered units
//!  └─ 3. Segment  per unit: check range, cut pages (bounded concurrency)
//! ```
//!
//! Each step is a transition of [`PipelineState`]:
//! `Init → Annotated → OracleResponded → Segmented`. States serialise to
//! JSON, so a run can stop after the oracle answers and resume later.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf_segment::{run, HasPageRange, LlmOracle, PageRange, SegmentationConfig};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Question {
//!     title: String,
//!     page_range: Option<PageRange>,
//! }
//!
//! impl HasPageRange for Question {
//!     fn page_range(&self) -> Option<PageRange> {
//!         self.page_range
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let oracle: LlmOracle<Question> = LlmOracle::from_env(None)?;
//!     let config = SegmentationConfig::default();
//!     let state = run("exam.pdf", "List every exam question with a title.", &oracle, &config).await?;
//!     for unit in state.parsed() {
//!         println!("{} (pages {})", unit.data().title, unit.page_range());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The default marker is sized for portrait pages. For landscape documents
//! lower the margin, e.g. `SegmentationConfig::builder().margin_frac(0.04)`,
//! otherwise annotation stops with `MarkerOutOfBounds`.
//!
//! ## pdfium
//!
//! The pdfium shared library is bound per operation. Set `PDFIUM_LIB_PATH`
//! to a library file or its directory, drop it next to the executable, or
//! install it system-wide.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod geometry;
pub mod oracle;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod segment;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FailurePolicy, ImageFormat, SegmentationConfig, SegmentationConfigBuilder};
pub use document::{bind_pdfium, count_pages, PdfInput};
pub use error::{ErrorKind, SegmentError, UnitError};
pub use geometry::{anchor_point, anchor_point_named, Anchor, AnchorSpec, Marker};
pub use oracle::{LlmOracle, LlmOracleOptions, OracleRequest, SegmentOracle};
pub use output::{load_snapshot, save_snapshot, write_outputs, OutputPaths};
pub use pipeline::annotate::annotate;
pub use pipeline::extract::extract;
pub use pipeline::raster::{from_images, to_images};
pub use progress::{NoopProgressCallback, ProgressCallback, SegmentationProgressCallback};
pub use segment::{consult, prepare, respond, run, run_sync, segment};
pub use state::{HasPageRange, PageRange, ParsedUnit, PipelineState, Stage};
