//! Configuration types for PDF segmentation.
//!
//! All pipeline behaviour is controlled through [`SegmentationConfig`], built
//! via its [`SegmentationConfigBuilder`]. The config is passed explicitly into
//! every stage; nothing is read from process-wide state.
//!
//! Validation happens in [`SegmentationConfigBuilder::build`], so a bad anchor
//! or margin is reported before any document is opened.

use crate::error::SegmentError;
use crate::geometry::{Anchor, AnchorSpec};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a segmentation run.
///
/// # Example
/// ```rust
/// use edgequake_pdf_segment::{Anchor, SegmentationConfig};
///
/// let config = SegmentationConfig::builder()
///     .anchor(Anchor::TopRight)
///     .margin_frac(0.05)
///     .render_scale(1.0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct SegmentationConfig {
    /// Where and how large the page-index marker is drawn.
    ///
    /// The radius scales with page width while the inset from a top or
    /// bottom corner scales with page height. On landscape pages the default
    /// `margin_frac` of 0.1 therefore pushes the circle past the page edge
    /// and annotation fails with `MarkerOutOfBounds`. A4 landscape
    /// (842 × 595 pt) with the default offset needs `margin_frac` ≤ 0.04.
    pub anchor: AnchorSpec,

    /// Zoom factor used when rasterising pages for the oracle. Default: 0.2.
    ///
    /// 1.0 renders one pixel per point (72 DPI). Small factors keep the
    /// multimodal request small; the circled index stays legible because the
    /// marker scales with the page.
    pub render_scale: f32,

    /// Raster format of the page images. Default: PNG.
    pub image_format: ImageFormat,

    /// MIME type announced in the oracle's data URIs. Default: `image/png`.
    pub image_mime: String,

    /// Number of units extracted concurrently. Default: 4.
    pub concurrency: usize,

    /// Upper bound on a single oracle call, in seconds. Default: 300.
    pub oracle_timeout_secs: u64,

    /// What `segment()` does when one unit cannot be extracted. Default: fail fast.
    pub failure_policy: FailurePolicy,

    /// First number used in `{stem}_page_{n}.{ext}` image names. Default: 0.
    pub image_name_start: usize,

    /// Optional receiver for stage and per-unit events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            anchor: AnchorSpec::default(),
            render_scale: 0.2,
            image_format: ImageFormat::default(),
            image_mime: ImageFormat::default().mime_type().to_string(),
            concurrency: 4,
            oracle_timeout_secs: 300,
            failure_policy: FailurePolicy::default(),
            image_name_start: 0,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SegmentationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentationConfig")
            .field("anchor", &self.anchor)
            .field("render_scale", &self.render_scale)
            .field("image_format", &self.image_format)
            .field("image_mime", &self.image_mime)
            .field("concurrency", &self.concurrency)
            .field("oracle_timeout_secs", &self.oracle_timeout_secs)
            .field("failure_policy", &self.failure_policy)
            .field("image_name_start", &self.image_name_start)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn SegmentationProgressCallback>"),
            )
            .finish()
    }
}

impl SegmentationConfig {
    /// Create a new builder for `SegmentationConfig`.
    pub fn builder() -> SegmentationConfigBuilder {
        SegmentationConfigBuilder {
            config: Self::default(),
            mime_overridden: false,
        }
    }
}

/// Builder for [`SegmentationConfig`].
#[derive(Debug)]
pub struct SegmentationConfigBuilder {
    config: SegmentationConfig,
    mime_overridden: bool,
}

impl SegmentationConfigBuilder {
    pub fn anchor(mut self, anchor: Anchor) -> Self {
        self.config.anchor.anchor = anchor;
        self
    }

    pub fn margin_frac(mut self, m: f32) -> Self {
        self.config.anchor.margin_frac = m;
        self
    }

    pub fn offset(mut self, x: f32, y: f32) -> Self {
        self.config.anchor.offset = (x, y);
        self
    }

    pub fn anchor_spec(mut self, spec: AnchorSpec) -> Self {
        self.config.anchor = spec;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    /// Also switches the data-URI MIME type unless [`Self::image_mime`] was set.
    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = format;
        if !self.mime_overridden {
            self.config.image_mime = format.mime_type().to_string();
        }
        self
    }

    pub fn image_mime(mut self, mime: impl Into<String>) -> Self {
        self.config.image_mime = mime.into();
        self.mime_overridden = true;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn oracle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.oracle_timeout_secs = secs;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn image_name_start(mut self, n: usize) -> Self {
        self.config.image_name_start = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SegmentationConfig, SegmentError> {
        let c = &self.config;
        c.anchor.validate()?;
        if !c.render_scale.is_finite() || c.render_scale <= 0.0 || c.render_scale > 10.0 {
            return Err(SegmentError::InvalidConfig(format!(
                "render scale must be in (0, 10], got {}",
                c.render_scale
            )));
        }
        if !c.image_mime.starts_with("image/") {
            return Err(SegmentError::InvalidConfig(format!(
                "image MIME type must start with 'image/', got '{}'",
                c.image_mime
            )));
        }
        if c.oracle_timeout_secs == 0 {
            return Err(SegmentError::InvalidConfig(
                "Oracle timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Raster format for page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless; keeps the marker digits crisp. (default)
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub(crate) fn as_image_format(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// Behaviour of `segment()` when a unit cannot be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Abort the run on the first failing unit and discard every extracted
    /// document. (default)
    #[default]
    FailFast,
    /// Keep the units that succeeded and record a
    /// [`crate::error::UnitError`] for each one that did not.
    SkipAndReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let c = SegmentationConfig::default();
        assert_eq!(c.anchor.anchor, Anchor::BottomLeft);
        assert!((c.anchor.margin_frac - 0.1).abs() < f32::EPSILON);
        assert_eq!(c.anchor.offset, (10.0, 10.0));
        assert_eq!(c.image_mime, "image/png");
        assert_eq!(c.failure_policy, FailurePolicy::FailFast);
    }

    #[test]
    fn builder_rejects_bad_margin() {
        let err = SegmentationConfig::builder()
            .margin_frac(0.6)
            .build()
            .unwrap_err();
        assert!(matches!(err, SegmentError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_bad_scale() {
        assert!(SegmentationConfig::builder().render_scale(0.0).build().is_err());
        assert!(SegmentationConfig::builder()
            .render_scale(f32::INFINITY)
            .build()
            .is_err());
    }

    #[test]
    fn jpeg_format_switches_mime_unless_overridden() {
        let c = SegmentationConfig::builder()
            .image_format(ImageFormat::Jpeg)
            .build()
            .unwrap();
        assert_eq!(c.image_mime, "image/jpeg");

        let c = SegmentationConfig::builder()
            .image_mime("image/png")
            .image_format(ImageFormat::Jpeg)
            .build()
            .unwrap();
        assert_eq!(c.image_mime, "image/png");
    }

    #[test]
    fn concurrency_clamped_to_one() {
        let c = SegmentationConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn debug_hides_callback() {
        let dbg = format!("{:?}", SegmentationConfig::default());
        assert!(dbg.contains("render_scale"));
        assert!(dbg.contains("progress_callback: None"));
    }
}
