//! Image payload encoding for the oracle: bytes → base64 data URIs.
//!
//! VLM APIs accept images as base64 data-URIs embedded in the JSON request
//! body. The MIME type is configurable because callers sometimes hand in
//! JPEG renders to keep the request small.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// `data:{mime};base64,{payload}` for one image.
pub fn to_data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Data URIs for an ordered list of page images.
pub fn to_data_uris(images: &[Vec<u8>], mime: &str) -> Vec<String> {
    images.iter().map(|img| to_data_uri(img, mime)).collect()
}

/// Wrap a page image as provider `ImageData`.
///
/// `detail: "high"` keeps the small circled index legible on providers that
/// otherwise downsample to a single overview tile.
pub fn to_image_data(bytes: &[u8], mime: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime).with_detail("high")
}
