//! Pipeline components used by the segmentation state machine.
//!
//! Each submodule implements exactly one transformation and is usable on its
//! own. All pdfium-backed functions are blocking; [`crate::segment`] runs
//! them on the blocking thread pool.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ annotate ──▶ raster ──▶ encode ──▶ (oracle) ──▶ extract
//! (path)    (markers)    (images)   (base64)               (per unit)
//! ```
//!
//! 1. [`input`]: validate the path or bytes (`%PDF` magic)
//! 2. [`annotate`]: draw the circled page index on every page
//! 3. [`raster`]: render pages to PNG/JPEG, or build a PDF from images
//! 4. [`encode`]: wrap images as data URIs for the oracle request
//! 5. [`extract`]: cut a contiguous page range into its own document

pub mod annotate;
pub mod encode;
pub mod extract;
pub mod input;
pub mod raster;
