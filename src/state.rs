//! Pipeline data model: page ranges, parsed units and the run state.
//!
//! [`PipelineState`] is a plain value. Each transition in [`crate::segment`]
//! consumes the current state and returns the next one, so a state can be
//! snapshotted to JSON at any stage and resumed later. Byte-valued fields are
//! base64 strings in the JSON form.

use crate::document::PdfInput;
use crate::error::{SegmentError, UnitError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 1-based, inclusive page interval as reported by the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub start_page: usize,
    pub end_page: usize,
}

impl PageRange {
    pub fn new(start_page: usize, end_page: usize) -> Self {
        Self {
            start_page,
            end_page,
        }
    }

    /// Check `1 ≤ start_page ≤ end_page ≤ page_count`.
    pub fn validate(&self, page_count: usize) -> Result<(), SegmentError> {
        if self.start_page == 0 || self.start_page > self.end_page || self.end_page > page_count {
            return Err(SegmentError::InvalidPageRange {
                start_page: self.start_page,
                end_page: self.end_page,
                page_count,
            });
        }
        Ok(())
    }

    /// 0-based inclusive bounds. Only meaningful after [`Self::validate`].
    pub fn zero_based(&self) -> (usize, usize) {
        (
            self.start_page.saturating_sub(1),
            self.end_page.saturating_sub(1),
        )
    }

    /// Number of pages covered.
    pub fn len(&self) -> usize {
        self.end_page
            .saturating_add(1)
            .saturating_sub(self.start_page)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_page, self.end_page)
    }
}

/// Capability every oracle unit must offer: the pages it spans.
///
/// Returning `None` makes `segment()` fail with
/// [`SegmentError::MissingPageRange`].
///
/// ```rust
/// use edgequake_pdf_segment::{HasPageRange, PageRange};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Section {
///     title: String,
///     page_range: Option<PageRange>,
/// }
///
/// impl HasPageRange for Section {
///     fn page_range(&self) -> Option<PageRange> {
///         self.page_range
///     }
/// }
/// ```
pub trait HasPageRange {
    fn page_range(&self) -> Option<PageRange>;
}

impl HasPageRange for PageRange {
    fn page_range(&self) -> Option<PageRange> {
        Some(*self)
    }
}

/// A semantic unit paired with the sub-document cut for its page range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedUnit<U> {
    data: U,
    page_range: PageRange,
    #[serde(with = "b64")]
    pdf_bytes: Vec<u8>,
}

impl<U> ParsedUnit<U> {
    pub(crate) fn new(data: U, page_range: PageRange, pdf_bytes: Vec<u8>) -> Self {
        Self {
            data,
            page_range,
            pdf_bytes,
        }
    }

    pub fn data(&self) -> &U {
        &self.data
    }

    /// The 1-based range the sub-document was cut from.
    pub fn page_range(&self) -> PageRange {
        self.page_range
    }

    pub fn pdf_bytes(&self) -> &[u8] {
        &self.pdf_bytes
    }

    pub fn into_parts(self) -> (U, Vec<u8>) {
        (self.data, self.pdf_bytes)
    }
}

/// Stage of a segmentation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Init,
    Annotated,
    OracleResponded,
    Segmented,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Annotated => "annotated",
            Stage::OracleResponded => "oracle-responded",
            Stage::Segmented => "segmented",
        };
        f.write_str(s)
    }
}

/// Everything one segmentation run produces, stage by stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState<U> {
    pub(crate) stage: Stage,
    pub(crate) source: PdfInput,
    pub(crate) prompt: String,
    #[serde(with = "b64::option", default)]
    pub(crate) annotated: Option<Vec<u8>>,
    #[serde(default)]
    pub(crate) annotated_pages: usize,
    #[serde(with = "b64::list", default)]
    pub(crate) page_images: Vec<Vec<u8>>,
    #[serde(default = "Vec::new")]
    pub(crate) raw_output: Vec<U>,
    #[serde(default = "Vec::new")]
    pub(crate) parsed: Vec<ParsedUnit<U>>,
    #[serde(default)]
    pub(crate) unit_errors: Vec<UnitError>,
}

impl<U> PipelineState<U> {
    /// Fresh state in [`Stage::Init`].
    pub fn new(source: impl Into<PdfInput>, prompt: impl Into<String>) -> Self {
        Self {
            stage: Stage::Init,
            source: source.into(),
            prompt: prompt.into(),
            annotated: None,
            annotated_pages: 0,
            page_images: Vec::new(),
            raw_output: Vec::new(),
            parsed: Vec::new(),
            unit_errors: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn source(&self) -> &PdfInput {
        &self.source
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Annotated document bytes, once [`Stage::Annotated`] is reached.
    pub fn annotated(&self) -> Option<&[u8]> {
        self.annotated.as_deref()
    }

    /// Page count of the annotated document (0 before annotation).
    pub fn annotated_pages(&self) -> usize {
        self.annotated_pages
    }

    /// Page images handed to the oracle, in page order.
    pub fn page_images(&self) -> &[Vec<u8>] {
        &self.page_images
    }

    /// Units as returned by the oracle, in oracle order.
    pub fn raw_output(&self) -> &[U] {
        &self.raw_output
    }

    /// Extracted units, in oracle order.
    pub fn parsed(&self) -> &[ParsedUnit<U>] {
        &self.parsed
    }

    /// Units skipped under [`crate::config::FailurePolicy::SkipAndReport`].
    pub fn unit_errors(&self) -> &[UnitError] {
        &self.unit_errors
    }

    pub fn into_parsed(self) -> Vec<ParsedUnit<U>> {
        self.parsed
    }

    pub(crate) fn expect_stage(&self, expected: Stage, to: Stage) -> Result<(), SegmentError> {
        if self.stage != expected {
            return Err(SegmentError::InvalidTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

impl<U: Serialize> PipelineState<U> {
    /// JSON snapshot with every byte field base64-encoded.
    pub fn to_json(&self) -> Result<String, SegmentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<U: serde::de::DeserializeOwned> PipelineState<U> {
    /// Restore a state written by [`Self::to_json`].
    pub fn from_json(json: &str) -> Result<Self, SegmentError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Serde adapters storing byte buffers as base64 strings.
pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text.as_bytes()).map_err(D::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => s.serialize_some(&STANDARD.encode(b)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|text| STANDARD.decode(text.as_bytes()).map_err(D::Error::custom))
                .transpose()
        }
    }

    pub mod list {
        use super::*;
        use serde::ser::SerializeSeq;

        pub fn serialize<S: Serializer>(items: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
            let mut seq = s.serialize_seq(Some(items.len()))?;
            for item in items {
                seq.serialize_element(&STANDARD.encode(item))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
            Vec::<String>::deserialize(d)?
                .into_iter()
                .map(|text| STANDARD.decode(text.as_bytes()).map_err(D::Error::custom))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_range_validation() {
        assert!(PageRange::new(1, 10).validate(10).is_ok());
        assert!(PageRange::new(3, 3).validate(10).is_ok());
        assert!(PageRange::new(0, 2).validate(10).is_err());
        assert!(PageRange::new(6, 3).validate(10).is_err());
        assert!(PageRange::new(1, 11).validate(10).is_err());
    }

    #[test]
    fn zero_based_conversion_and_len() {
        let r = PageRange::new(2, 4);
        assert_eq!(r.zero_based(), (1, 3));
        assert_eq!(r.len(), 3);
        assert_eq!(PageRange::new(5, 2).len(), 0);
        assert_eq!(r.to_string(), "2-4");
    }

    #[test]
    fn len_saturates_on_extreme_bounds() {
        assert_eq!(PageRange::new(1, usize::MAX).len(), usize::MAX);
        assert_eq!(PageRange::new(0, usize::MAX).len(), usize::MAX);
        assert!(PageRange::new(usize::MAX, 1).is_empty());
        assert!(PageRange::new(1, usize::MAX).validate(10).is_err());
    }

    #[test]
    fn stage_order_enforced() {
        let state: PipelineState<PageRange> = PipelineState::new("a.pdf", "p");
        assert!(state.expect_stage(Stage::Init, Stage::Annotated).is_ok());
        let err = state
            .expect_stage(Stage::OracleResponded, Stage::Segmented)
            .unwrap_err();
        assert!(err.to_string().contains("'init'"));
    }

    #[test]
    fn snapshot_encodes_bytes_as_base64() {
        let mut state: PipelineState<PageRange> =
            PipelineState::new(PdfInput::Bytes(b"%PDF".to_vec()), "find sections");
        state.stage = Stage::Segmented;
        state.annotated = Some(vec![1, 2, 3]);
        state.annotated_pages = 1;
        state.page_images = vec![vec![9, 9]];
        state.raw_output = vec![PageRange::new(1, 1)];
        state.parsed = vec![ParsedUnit::new(PageRange::new(1, 1), PageRange::new(1, 1), vec![4, 5])];

        let json = state.to_json().unwrap();
        assert!(json.contains("\"AQID\""), "annotated bytes: {json}");
        assert!(json.contains("\"CQk=\""), "page image: {json}");
        assert!(json.contains("\"BAU=\""), "unit pdf: {json}");
        assert!(json.contains("\"JVBERg==\""), "source bytes: {json}");

        let back: PipelineState<PageRange> = PipelineState::from_json(&json).unwrap();
        assert_eq!(back.stage(), Stage::Segmented);
        assert_eq!(back.annotated(), Some(&[1u8, 2, 3][..]));
        assert_eq!(back.parsed()[0].pdf_bytes(), &[4, 5]);
        assert_eq!(back.source(), state.source());
    }

    #[test]
    fn snapshot_rejects_bad_base64() {
        let json = r#"{"stage":"Annotated","source":{"Path":"a.pdf"},"prompt":"p","annotated":"!!"}"#;
        assert!(PipelineState::<PageRange>::from_json(json).is_err());
    }
}
