//! Rasterisation: PDF pages → encoded images, and images → PDF.
//!
//! pdfium renders each page at `scale` × its point size (1.0 = one pixel per
//! point). The inverse direction builds a fresh document whose pages are
//! exactly as large, in points, as each image is in pixels, so a round trip
//! at scale 1.0 reproduces the original page sizes and any other scale
//! reproduces the aspect ratios.

use crate::config::ImageFormat;
use crate::document::{self, PdfInput};
use crate::error::SegmentError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use tracing::{debug, info};

/// Render every page of `input` to encoded image bytes, in page order.
///
/// Blocking; call from `spawn_blocking` inside async code.
///
/// # Errors
/// [`SegmentError::UnsupportedInputType`] when `input` is already a sequence
/// of images.
pub fn to_images(
    input: &PdfInput,
    scale: f32,
    format: ImageFormat,
) -> Result<Vec<Vec<u8>>, SegmentError> {
    if let PdfInput::Images(images) = input {
        return Err(SegmentError::UnsupportedInputType {
            detail: format!(
                "expected a PDF path or PDF bytes, got {} raster images",
                images.len()
            ),
        });
    }
    if !scale.is_finite() || scale <= 0.0 {
        return Err(SegmentError::InvalidConfig(format!(
            "render scale must be positive, got {}",
            scale
        )));
    }

    let pdfium = document::bind_pdfium()?;
    let doc = document::open(&pdfium, input)?;
    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

    let mut images = Vec::with_capacity(document::page_count(&doc));
    for (idx, page) in doc.pages().iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            SegmentError::RasterisationFailed {
                page: idx,
                detail: format!("{:?}", e),
            }
        })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx,
            image.width(),
            image.height()
        );
        images.push(encode_image(&image, format).map_err(|e| {
            SegmentError::ImageEncodingFailed {
                page: idx,
                detail: e.to_string(),
            }
        })?);
    }

    info!("Rasterised {} pages at scale {}", images.len(), scale);
    Ok(images)
}

/// Build a PDF with one page per image, each page sized to its image.
pub fn from_images(images: &[Vec<u8>]) -> Result<Vec<u8>, SegmentError> {
    let pdfium = document::bind_pdfium()?;
    let doc = assemble(&pdfium, images)?;
    document::save(&doc, "saving image document")
}

/// Build the image document inside an existing pdfium binding.
pub(crate) fn assemble<'a>(
    pdfium: &'a Pdfium,
    images: &[Vec<u8>],
) -> Result<PdfDocument<'a>, SegmentError> {
    let mut doc = pdfium
        .create_new_pdf()
        .map_err(|e| SegmentError::pdfium("creating document", e))?;

    for (idx, bytes) in images.iter().enumerate() {
        let image = image::load_from_memory(bytes).map_err(|e| SegmentError::MalformedImage {
            index: idx,
            detail: e.to_string(),
        })?;
        let width = PdfPoints::new(image.width() as f32);
        let height = PdfPoints::new(image.height() as f32);

        let mut page = doc
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(|e| SegmentError::pdfium(format!("adding page {}", idx), e))?;
        page.objects_mut()
            .create_image_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                &image,
                Some(width),
                Some(height),
            )
            .map_err(|e| SegmentError::pdfium(format!("placing image {}", idx), e))?;
    }

    debug!("Assembled document from {} images", images.len());
    Ok(doc)
}

/// Encode a rendered page in the requested format.
///
/// JPEG has no alpha channel, so RGBA renders are flattened to RGB first.
pub fn encode_image(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Png => image.write_to(&mut Cursor::new(&mut buf), format.as_image_format())?,
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut Cursor::new(&mut buf), format.as_image_format())?,
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_png_signature() {
        let bytes = encode_image(&red_square(10, 8), ImageFormat::Png).expect("encode");
        assert_eq!(&bytes[..4], b"\x89PNG");
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (10, 8));
    }

    #[test]
    fn encode_jpeg_from_rgba() {
        let bytes = encode_image(&red_square(16, 16), ImageFormat::Jpeg).expect("encode");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn image_sequence_cannot_be_rasterised() {
        let err = to_images(&PdfInput::Images(vec![vec![1, 2, 3]]), 1.0, ImageFormat::Png)
            .unwrap_err();
        assert!(matches!(err, SegmentError::UnsupportedInputType { .. }));
    }
}
