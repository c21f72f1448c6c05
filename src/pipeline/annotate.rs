//! Page annotation: stamp every page with a circled 0-based page index.
//!
//! The oracle sees only page images, so it has no reliable way to tell page
//! 7 from page 8 of a scanned lecture. A visible index in a fixed corner
//! gives it an unambiguous citation target.
//!
//! Rotation is cleared before any geometry is computed: pdfium reports the
//! page size of the rotated display box, and a marker placed against that box
//! and then rotated would land in the wrong corner.
//!
//! Annotation is not idempotent. Annotating already-annotated bytes draws a
//! second marker on top of the first.

use crate::document::{self, PdfInput};
use crate::error::SegmentError;
use crate::geometry::{to_pdf_y, AnchorSpec};
use pdfium_render::prelude::*;
use tracing::{debug, info};

const MARKER_STROKE_WIDTH: f32 = 1.0;

/// Annotate every page of `input` and return the re-serialised document.
///
/// Blocking; call from `spawn_blocking` inside async code. Nothing is
/// returned unless every page was annotated.
pub fn annotate(input: &PdfInput, spec: &AnchorSpec) -> Result<Vec<u8>, SegmentError> {
    spec.validate()?;

    let pdfium = document::bind_pdfium()?;
    let mut doc = document::open(&pdfium, input)?;
    let font = doc.fonts_mut().helvetica();
    let total = document::page_count(&doc);

    for (idx, mut page) in doc.pages().iter().enumerate() {
        annotate_page(&mut page, idx, spec, font)?;
    }

    let bytes = document::save(&doc, "saving annotated document")?;
    info!("Annotated {} pages ({} bytes)", total, bytes.len());
    Ok(bytes)
}

fn annotate_page(
    page: &mut PdfPage<'_>,
    index: usize,
    spec: &AnchorSpec,
    font: PdfFontToken,
) -> Result<(), SegmentError> {
    if !matches!(page.rotation(), Ok(PdfPageRenderRotation::None)) {
        debug!("Page {}: clearing rotation", index);
        page.set_rotation(PdfPageRenderRotation::None);
    }

    let width = page.width().value;
    let height = page.height().value;
    let marker = spec.marker(width, height);
    if !marker.fits_within(width, height) {
        return Err(SegmentError::MarkerOutOfBounds {
            page: index,
            width,
            height,
            cx: marker.cx,
            cy: marker.cy,
            radius: marker.radius,
        });
    }

    page.objects_mut()
        .create_path_object_circle_at(
            PdfPoints::new(marker.cx),
            PdfPoints::new(to_pdf_y(height, marker.cy)),
            PdfPoints::new(marker.radius),
            Some(PdfColor::new(0, 0, 0, 255)),
            Some(PdfPoints::new(MARKER_STROKE_WIDTH)),
            None,
        )
        .map_err(|e| SegmentError::pdfium(format!("drawing marker on page {}", index), e))?;

    let label = index.to_string();
    let (x, y) = marker.label_origin(&label);
    page.objects_mut()
        .create_text_object(
            PdfPoints::new(x),
            PdfPoints::new(to_pdf_y(height, y)),
            &label,
            font,
            PdfPoints::new(marker.font_size()),
        )
        .map_err(|e| SegmentError::pdfium(format!("drawing label on page {}", index), e))?;

    debug!(
        "Page {}: marker at ({:.1}, {:.1}) r={:.1}",
        index, marker.cx, marker.cy, marker.radius
    );
    Ok(())
}
