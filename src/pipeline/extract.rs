//! Page-range extraction: copy a contiguous run of pages into a new PDF.
//!
//! Bounds are 0-based and inclusive. The result is a standalone document;
//! pdfium copies page content rather than referencing the source, and every
//! copied page is set upright.

use crate::document::{self, PdfInput};
use crate::error::SegmentError;
use pdfium_render::prelude::*;
use tracing::debug;

/// Check that `start..=end` addresses existing pages of a `page_count`-page
/// document.
pub fn check_range(start: usize, end: usize, page_count: usize) -> Result<(), SegmentError> {
    if start > end || end >= page_count {
        return Err(SegmentError::RangeOutOfBounds {
            start,
            end,
            page_count,
        });
    }
    Ok(())
}

/// Extract pages `start..=end` (0-based, inclusive) of `input`.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn extract(input: &PdfInput, start: usize, end: usize) -> Result<Vec<u8>, SegmentError> {
    let pdfium = document::bind_pdfium()?;
    let source = document::open(&pdfium, input)?;
    check_range(start, end, document::page_count(&source))?;

    let mut target = pdfium
        .create_new_pdf()
        .map_err(|e| SegmentError::pdfium("creating document", e))?;
    target
        .pages_mut()
        .copy_page_range_from_document(
            &source,
            (start as PdfPageIndex)..=(end as PdfPageIndex),
            0,
        )
        .map_err(|e| SegmentError::pdfium(format!("copying pages {}..={}", start, end), e))?;

    for mut page in target.pages().iter() {
        if !matches!(page.rotation(), Ok(PdfPageRenderRotation::None)) {
            page.set_rotation(PdfPageRenderRotation::None);
        }
    }

    let bytes = document::save(&target, "saving extracted document")?;
    debug!(
        "Extracted pages {}..={} → {} bytes",
        start,
        end,
        bytes.len()
    );
    Ok(bytes)
}
