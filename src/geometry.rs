//! Marker geometry: where the page-index circle goes on a page.
//!
//! All functions here are pure and work in page points with the origin at the
//! **top-left** corner and y increasing downward. pdfium uses a bottom-left
//! origin; [`to_pdf_y`] performs the flip at the drawing boundary so that
//! every formula in this module can be tested without opening a document.

use crate::error::SegmentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Advance width of a Helvetica digit, in em units (all ten digits share it).
const HELVETICA_DIGIT_ADVANCE: f32 = 0.556;

/// Helvetica cap height in em units; digits are drawn at cap height.
const HELVETICA_CAP_HEIGHT: f32 = 0.718;

/// Page corner used as the reference point for marker placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    #[default]
    BottomLeft,
    BottomRight,
}

impl Anchor {
    pub const ALL: [Anchor; 4] = [
        Anchor::TopLeft,
        Anchor::TopRight,
        Anchor::BottomLeft,
        Anchor::BottomRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Anchor::TopLeft => "top-left",
            Anchor::TopRight => "top-right",
            Anchor::BottomLeft => "bottom-left",
            Anchor::BottomRight => "bottom-right",
        }
    }

    fn is_right(&self) -> bool {
        matches!(self, Anchor::TopRight | Anchor::BottomRight)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Anchor::BottomLeft | Anchor::BottomRight)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Anchor {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Anchor::ALL
            .into_iter()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| SegmentError::InvalidAnchor {
                value: s.to_string(),
            })
    }
}

/// Immutable marker placement settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorSpec {
    pub anchor: Anchor,
    /// Fraction of the page width (radius, horizontal inset) and height
    /// (vertical inset). Must lie in the open interval (0, 0.5).
    pub margin_frac: f32,
    /// Extra inset from the anchor corner, in points.
    pub offset: (f32, f32),
}

impl Default for AnchorSpec {
    fn default() -> Self {
        Self {
            anchor: Anchor::BottomLeft,
            margin_frac: 0.1,
            offset: (10.0, 10.0),
        }
    }
}

impl AnchorSpec {
    pub fn new(anchor: Anchor, margin_frac: f32, offset: (f32, f32)) -> Result<Self, SegmentError> {
        let spec = Self {
            anchor,
            margin_frac,
            offset,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Page-independent checks. Containment on a concrete page is checked by
    /// [`Marker::fits_within`].
    pub fn validate(&self) -> Result<(), SegmentError> {
        let m = self.margin_frac;
        if !m.is_finite() || m <= 0.0 || m >= 0.5 {
            return Err(SegmentError::InvalidConfig(format!(
                "margin fraction must be in (0, 0.5), got {}",
                m
            )));
        }
        let (ox, oy) = self.offset;
        if !ox.is_finite() || !oy.is_finite() {
            return Err(SegmentError::InvalidConfig(format!(
                "marker offset must be finite, got ({}, {})",
                ox, oy
            )));
        }
        Ok(())
    }

    /// Marker for a page of the given size.
    pub fn marker(&self, width: f32, height: f32) -> Marker {
        let (cx, cy) = anchor_point(width, height, self.margin_frac, self.offset, self.anchor);
        Marker {
            cx,
            cy,
            radius: width * self.margin_frac,
        }
    }
}

/// Compute the marker centre for `anchor` on a `width` × `height` page.
pub fn anchor_point(
    width: f32,
    height: f32,
    margin_frac: f32,
    offset: (f32, f32),
    anchor: Anchor,
) -> (f32, f32) {
    let (x_off, y_off) = offset;
    let cx = if anchor.is_right() {
        width - width * margin_frac - x_off
    } else {
        width * margin_frac + x_off
    };
    let cy = if anchor.is_bottom() {
        height - height * margin_frac - y_off
    } else {
        height * margin_frac + y_off
    };
    (cx, cy)
}

/// Same as [`anchor_point`] but with the anchor given by name.
pub fn anchor_point_named(
    width: f32,
    height: f32,
    margin_frac: f32,
    offset: (f32, f32),
    anchor: &str,
) -> Result<(f32, f32), SegmentError> {
    let anchor = anchor.parse::<Anchor>()?;
    Ok(anchor_point(width, height, margin_frac, offset, anchor))
}

/// A marker circle in top-left page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
}

impl Marker {
    /// True if the whole circle lies inside the page rectangle.
    pub fn fits_within(&self, width: f32, height: f32) -> bool {
        self.cx - self.radius >= 0.0
            && self.cy - self.radius >= 0.0
            && self.cx + self.radius <= width
            && self.cy + self.radius <= height
    }

    /// Font size of the label drawn inside the circle.
    pub fn font_size(&self) -> f32 {
        self.radius
    }

    /// Bounding square of side `2r` centred on the marker:
    /// `(left, top, right, bottom)`.
    pub fn label_box(&self) -> (f32, f32, f32, f32) {
        (
            self.cx - self.radius,
            self.cy - self.radius,
            self.cx + self.radius,
            self.cy + self.radius,
        )
    }

    /// Baseline origin `(x, y)` (top-left coordinates) that centres `label`
    /// in [`Marker::label_box`] when set in Helvetica at [`Marker::font_size`].
    pub fn label_origin(&self, label: &str) -> (f32, f32) {
        let size = self.font_size();
        let text_width = label.chars().count() as f32 * HELVETICA_DIGIT_ADVANCE * size;
        let cap_height = HELVETICA_CAP_HEIGHT * size;
        let (left, top, right, bottom) = self.label_box();
        let (cx, cy) = ((left + right) / 2.0, (top + bottom) / 2.0);
        (cx - text_width / 2.0, cy + cap_height / 2.0)
    }
}

/// Flip a top-left y coordinate into pdfium's bottom-left space.
pub fn to_pdf_y(page_height: f32, y: f32) -> f32 {
    page_height - y
}
