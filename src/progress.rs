//! Progress-callback trait for pipeline stage and per-unit events.
//!
//! Inject an [`Arc<dyn SegmentationProgressCallback>`] via
//! [`crate::config::SegmentationConfigBuilder::progress_callback`] to receive
//! events as the pipeline annotates the document and cuts out each unit.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf_segment::{SegmentationConfig, SegmentationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     extracted: AtomicUsize,
//! }
//!
//! impl SegmentationProgressCallback for CountingCallback {
//!     fn on_unit_extracted(&self, unit: usize, total_units: usize, pdf_len: usize) {
//!         self.extracted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("unit {}/{} -> {} bytes", unit + 1, total_units, pdf_len);
//!     }
//! }
//!
//! let config = SegmentationConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { extracted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::state::Stage;
use std::sync::Arc;

/// Called by the segmentation pipeline as it moves between stages.
///
/// Unit events may arrive concurrently and out of unit order, since units
/// are extracted in parallel. All methods default to no-ops.
pub trait SegmentationProgressCallback: Send + Sync {
    /// Called when a transition towards `stage` begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when the pipeline has reached `stage`.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a unit's sub-document has been extracted.
    ///
    /// # Arguments
    /// * `unit`: 0-based position in the oracle output
    /// * `total_units`: number of units being extracted
    /// * `pdf_len`: byte length of the extracted document
    fn on_unit_extracted(&self, unit: usize, total_units: usize, pdf_len: usize) {
        let _ = (unit, total_units, pdf_len);
    }

    /// Called when a unit could not be extracted.
    fn on_unit_error(&self, unit: usize, total_units: usize, error: &str) {
        let _ = (unit, total_units, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SegmentationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SegmentationConfig`].
pub type ProgressCallback = Arc<dyn SegmentationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<Stage>>,
        extracted: AtomicUsize,
        errors: AtomicUsize,
    }

    impl SegmentationProgressCallback for TrackingCallback {
        fn on_stage_complete(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_unit_extracted(&self, _unit: usize, _total: usize, _len: usize) {
            self.extracted.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unit_error(&self, _unit: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Annotated);
        cb.on_stage_complete(Stage::Annotated);
        cb.on_unit_extracted(0, 2, 1024);
        cb.on_unit_error(1, 2, "out of range");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage_complete(Stage::Annotated);
        tracker.on_stage_complete(Stage::Segmented);
        tracker.on_unit_extracted(0, 2, 10);
        tracker.on_unit_error(1, 2, "bad range");

        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::Annotated, Stage::Segmented]
        );
        assert_eq!(tracker.extracted.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Segmented);
    }
}
