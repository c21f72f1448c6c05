//! Integration tests for the segmentation pipeline.
//!
//! Documents are synthesised from blank raster pages with `from_images`, so
//! no fixture files are needed. Every test that touches pdfium is skipped
//! when the library cannot be bound.
//!
//! Run with:
//!   PDFIUM_LIB_PATH=/path/to/libpdfium cargo test --test pipeline -- --nocapture

use pdfium_render::prelude::PdfPageObjectsCommon;
use edgequake_pdf_segment::document::{page_object_counts, page_sizes};
use edgequake_pdf_segment::pipeline::raster::encode_image;
use edgequake_pdf_segment::geometry::to_pdf_y;
use edgequake_pdf_segment::{
    anchor_point, annotate, bind_pdfium, count_pages, extract, from_images, load_snapshot,
    prepare, respond, run, save_snapshot, segment, to_images, Anchor, AnchorSpec, ErrorKind,
    FailurePolicy, HasPageRange,
    ImageFormat, OracleRequest, PageRange, PdfInput, PipelineState, SegmentError,
    SegmentOracle, SegmentationConfig, SegmentationProgressCallback, Stage,
};
use image::{DynamicImage, Rgba, RgbaImage};
use pdfium_render::prelude::{PdfPageObjectCommon, PdfPageObjectType, PdfPageRenderRotation};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test if no pdfium library can be bound.
macro_rules! skip_without_pdfium {
    () => {{
        if let Err(e) = bind_pdfium() {
            println!("SKIP: pdfium not available: {e}");
            return;
        }
    }};
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn blank_page(w: u32, h: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])));
    encode_image(&img, ImageFormat::Png).unwrap()
}

/// A `pages`-page portrait PDF, 120×160 pt per page.
fn synthetic_pdf(pages: usize) -> Vec<u8> {
    let images: Vec<Vec<u8>> = (0..pages).map(|_| blank_page(120, 160)).collect();
    from_images(&images).unwrap()
}

/// Set the `/Rotate` entry of every page.
fn rotate_pages(bytes: &[u8], rotation: PdfPageRenderRotation) -> Vec<u8> {
    let pdfium = bind_pdfium().unwrap();
    let doc = pdfium.load_pdf_from_byte_slice(bytes, None).unwrap();
    for mut page in doc.pages().iter() {
        page.set_rotation(rotation);
    }
    doc.save_to_bytes().unwrap()
}

fn all_upright(bytes: &[u8]) -> bool {
    let pdfium = bind_pdfium().unwrap();
    let doc = pdfium.load_pdf_from_byte_slice(bytes, None).unwrap();
    let upright = doc
        .pages()
        .iter()
        .all(|page| matches!(page.rotation(), Ok(PdfPageRenderRotation::None)));
    upright
}

/// Centre of the first path object on each page, in PDF user space.
fn path_centres(bytes: &[u8]) -> Vec<(f32, f32)> {
    let pdfium = bind_pdfium().unwrap();
    let doc = pdfium.load_pdf_from_byte_slice(bytes, None).unwrap();
    let centres = doc
        .pages()
        .iter()
        .map(|page| {
            let path = page
                .objects()
                .iter()
                .find(|o| matches!(o.object_type(), PdfPageObjectType::Path))
                .expect("page has no path object");
            let b = path.bounds().unwrap();
            (
                (b.left().value + b.right().value) / 2.0,
                (b.top().value + b.bottom().value) / 2.0,
            )
        })
        .collect();
    centres
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Section {
    title: String,
    page_range: Option<PageRange>,
}

impl HasPageRange for Section {
    fn page_range(&self) -> Option<PageRange> {
        self.page_range
    }
}

fn section(title: &str, start: usize, end: usize) -> Section {
    Section {
        title: title.to_string(),
        page_range: Some(PageRange::new(start, end)),
    }
}

/// Oracle that answers with a fixed list and records what it was asked.
struct ScriptedOracle {
    units: Vec<Section>,
    delay: Option<Duration>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    fn new(units: Vec<Section>) -> Self {
        Self {
            units,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl SegmentOracle<Section> for ScriptedOracle {
    async fn respond(&self, request: OracleRequest) -> Result<Vec<Section>, SegmentError> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.units.clone())
    }
}

#[derive(Default)]
struct CountingCallback {
    stages: Mutex<Vec<Stage>>,
    extracted: AtomicUsize,
    errors: AtomicUsize,
}

impl SegmentationProgressCallback for CountingCallback {
    fn on_stage_complete(&self, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_unit_extracted(&self, _unit: usize, _total: usize, _pdf_len: usize) {
        self.extracted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_unit_error(&self, _unit: usize, _total: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[test]
fn test_extract_full_and_single_page() {
    skip_without_pdfium!();
    let doc = PdfInput::Bytes(synthetic_pdf(10));

    let all = extract(&doc, 0, 9).unwrap();
    assert_eq!(count_pages(&PdfInput::Bytes(all)).unwrap(), 10);

    let one = extract(&doc, 4, 4).unwrap();
    assert_eq!(count_pages(&PdfInput::Bytes(one)).unwrap(), 1);

    let some = extract(&doc, 2, 6).unwrap();
    assert_eq!(count_pages(&PdfInput::Bytes(some)).unwrap(), 5);
}

#[test]
fn test_extract_from_rotated_source_is_upright() {
    skip_without_pdfium!();
    let rotated = rotate_pages(&synthetic_pdf(4), PdfPageRenderRotation::Degrees90);
    assert!(!all_upright(&rotated));

    let cut = extract(&PdfInput::Bytes(rotated), 1, 3).unwrap();
    assert_eq!(count_pages(&PdfInput::Bytes(cut.clone())).unwrap(), 3);
    assert!(all_upright(&cut));
}

#[test]
fn test_extract_rejects_bad_ranges() {
    skip_without_pdfium!();
    let doc = PdfInput::Bytes(synthetic_pdf(10));

    for (start, end) in [(5, 2), (0, 99)] {
        let err = extract(&doc, start, end).unwrap_err();
        assert!(
            matches!(err, SegmentError::RangeOutOfBounds { page_count: 10, .. }),
            "[{start},{end}] gave {err:?}"
        );
        assert_eq!(err.kind(), ErrorKind::Range);
    }
}

// ── Rasterisation ────────────────────────────────────────────────────────────

#[test]
fn test_raster_round_trip_keeps_pages_and_aspect() {
    skip_without_pdfium!();
    let source = from_images(&[blank_page(200, 100), blank_page(90, 180)]).unwrap();
    let before = page_sizes(&PdfInput::Bytes(source.clone())).unwrap();

    let images = to_images(&PdfInput::Bytes(source), 1.0, ImageFormat::Png).unwrap();
    assert_eq!(images.len(), 2);

    let rebuilt = from_images(&images).unwrap();
    let after = page_sizes(&PdfInput::Bytes(rebuilt)).unwrap();
    assert_eq!(after.len(), before.len());
    for ((bw, bh), (aw, ah)) in before.iter().zip(&after) {
        assert!(((bw / bh) - (aw / ah)).abs() < 0.02, "{bw}x{bh} vs {aw}x{ah}");
    }
}

#[test]
fn test_from_images_rejects_garbage() {
    skip_without_pdfium!();
    let err = from_images(&[blank_page(10, 10), b"not an image".to_vec()]).unwrap_err();
    assert!(matches!(err, SegmentError::MalformedImage { index: 1, .. }));
}

// ── Annotation ───────────────────────────────────────────────────────────────

#[test]
fn test_annotation_adds_objects_every_time() {
    skip_without_pdfium!();
    let doc = PdfInput::Bytes(synthetic_pdf(3));
    let spec = AnchorSpec::default();

    let base = page_object_counts(&doc).unwrap();
    let once = annotate(&doc, &spec).unwrap();
    let once_counts = page_object_counts(&PdfInput::Bytes(once.clone())).unwrap();
    let twice = annotate(&PdfInput::Bytes(once), &spec).unwrap();
    let twice_counts = page_object_counts(&PdfInput::Bytes(twice)).unwrap();

    for page in 0..3 {
        assert!(once_counts[page] > base[page], "page {page}: {once_counts:?}");
        assert!(twice_counts[page] > once_counts[page], "page {page}: {twice_counts:?}");
    }
}

#[test]
fn test_annotation_clears_rotation_and_places_marker() {
    skip_without_pdfium!();
    let rotated = rotate_pages(&synthetic_pdf(2), PdfPageRenderRotation::Degrees90);

    // 120×160 page, margin 0.1, offset (10, 10): radius 12.
    for (anchor, expected) in [(Anchor::BottomLeft, (22.0, 26.0)), (Anchor::TopRight, (98.0, 134.0))] {
        let spec = AnchorSpec::new(anchor, 0.1, (10.0, 10.0)).unwrap();
        let (cx, cy) = anchor_point(120.0, 160.0, 0.1, (10.0, 10.0), anchor);
        assert!((cx - expected.0).abs() < 1e-3 && (to_pdf_y(160.0, cy) - expected.1).abs() < 1e-3);

        let annotated = annotate(&PdfInput::Bytes(rotated.clone()), &spec).unwrap();
        assert!(all_upright(&annotated), "{anchor:?}: rotation survived annotation");

        for (page, (x, y)) in path_centres(&annotated).into_iter().enumerate() {
            assert!(
                (x - expected.0).abs() < 1.5 && (y - expected.1).abs() < 1.5,
                "{anchor:?} page {page}: marker centred at ({x}, {y}), expected {expected:?}"
            );
        }
    }
}

#[test]
fn test_annotation_rejects_marker_off_page() {
    skip_without_pdfium!();
    let doc = PdfInput::Bytes(from_images(&[blank_page(300, 40)]).unwrap());
    let spec = AnchorSpec::new(Default::default(), 0.2, (0.0, 0.0)).unwrap();
    let err = annotate(&doc, &spec).unwrap_err();
    assert!(matches!(err, SegmentError::MarkerOutOfBounds { page: 0, .. }));
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_prepare_missing_file() {
    let state: PipelineState<Section> = PipelineState::new("/no/such/lecture.pdf", "p");
    let err = prepare(state, &SegmentationConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentError::FileNotFound { .. }));
}

#[tokio::test]
async fn test_run_preserves_oracle_order() {
    skip_without_pdfium!();
    init_tracing();

    let units = vec![
        section("derivation", 3, 4),
        section("intro", 1, 1),
        section("long proof", 5, 10),
        section("aside", 2, 2),
    ];
    let oracle = ScriptedOracle::new(units.clone());
    let callback = Arc::new(CountingCallback::default());
    let config = SegmentationConfig::builder()
        .concurrency(4)
        .progress_callback(callback.clone())
        .build()
        .unwrap();

    let state: PipelineState<Section> = run(
        synthetic_pdf(10),
        "Find the derivations.",
        &oracle,
        &config,
    )
    .await
    .unwrap();

    assert_eq!(state.stage(), Stage::Segmented);
    assert_eq!(state.annotated_pages(), 10);
    let titles: Vec<_> = state.parsed().iter().map(|u| u.data().title.clone()).collect();
    assert_eq!(titles, vec!["derivation", "intro", "long proof", "aside"]);
    for unit in state.parsed() {
        let pages = count_pages(&PdfInput::Bytes(unit.pdf_bytes().to_vec())).unwrap();
        assert_eq!(pages, unit.page_range().len());
    }

    let requests = oracle.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].images.len(), 10);
    assert_eq!(requests[0].mime, "image/png");
    assert!(requests[0].prompt.starts_with("Find the derivations."));
    assert!(requests[0].prompt.contains("circled number"));

    assert_eq!(callback.extracted.load(Ordering::SeqCst), 4);
    assert_eq!(callback.errors.load(Ordering::SeqCst), 0);
    assert_eq!(
        *callback.stages.lock().unwrap(),
        vec![Stage::Annotated, Stage::OracleResponded, Stage::Segmented]
    );
}

#[tokio::test]
async fn test_units_are_cut_from_annotated_document() {
    skip_without_pdfium!();
    let source = synthetic_pdf(2);
    let base = page_object_counts(&PdfInput::Bytes(source.clone())).unwrap();

    let config = SegmentationConfig::default();
    let state = prepare(PipelineState::new(source, "p"), &config).await.unwrap();
    let state = respond(state, vec![section("second", 2, 2)]).unwrap();
    let state = segment(state, &config).await.unwrap();

    let counts = page_object_counts(&PdfInput::Bytes(state.parsed()[0].pdf_bytes().to_vec())).unwrap();
    assert_eq!(counts.len(), 1);
    assert!(counts[0] > base[1], "extracted page carries the marker");
}

#[tokio::test]
async fn test_missing_page_range_fails_fast() {
    skip_without_pdfium!();
    let config = SegmentationConfig::default();
    let state = prepare(PipelineState::new(synthetic_pdf(3), "p"), &config)
        .await
        .unwrap();
    let untitled = Section {
        title: "no range".into(),
        page_range: None,
    };
    let state = respond(state, vec![section("ok", 1, 1), untitled]).unwrap();

    let err = segment(state, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(matches!(err, SegmentError::UnitFailed { unit: 1, .. }));
}

#[tokio::test]
async fn test_out_of_range_unit_fails_fast() {
    skip_without_pdfium!();
    let config = SegmentationConfig::default();
    let state = prepare(PipelineState::new(synthetic_pdf(10), "p"), &config)
        .await
        .unwrap();
    let state = respond(state, vec![section("a", 1, 2), section("b", 9, 11)]).unwrap();

    let err = segment(state, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
    assert!(err.to_string().starts_with("Unit 1 failed"));
}

#[tokio::test]
async fn test_skip_and_report_keeps_good_units() {
    skip_without_pdfium!();
    let config = SegmentationConfig::builder()
        .failure_policy(FailurePolicy::SkipAndReport)
        .build()
        .unwrap();
    let state = prepare(PipelineState::new(synthetic_pdf(4), "p"), &config)
        .await
        .unwrap();
    let state = respond(
        state,
        vec![section("a", 1, 2), section("bad", 3, 8), section("c", 4, 4)],
    )
    .unwrap();

    let state = segment(state, &config).await.unwrap();
    let titles: Vec<_> = state.parsed().iter().map(|u| u.data().title.as_str()).collect();
    assert_eq!(titles, vec!["a", "c"]);
    assert_eq!(state.unit_errors().len(), 1);
    assert_eq!(state.unit_errors()[0].unit, 1);
    assert_eq!(state.unit_errors()[0].kind, ErrorKind::Range);
}

#[tokio::test]
async fn test_wrong_stage_is_rejected() {
    skip_without_pdfium!();
    let config = SegmentationConfig::default();
    let state = prepare(PipelineState::new(synthetic_pdf(1), "p"), &config)
        .await
        .unwrap();
    let err = segment::<Section>(state, &config).await.unwrap_err();
    assert!(matches!(err, SegmentError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_oracle_timeout() {
    skip_without_pdfium!();
    let config = SegmentationConfig::builder()
        .oracle_timeout_secs(1)
        .build()
        .unwrap();
    let mut oracle = ScriptedOracle::new(vec![section("a", 1, 1)]);
    oracle.delay = Some(Duration::from_secs(5));

    let result: Result<PipelineState<Section>, _> =
        run(synthetic_pdf(1), "p", &oracle, &config).await;
    let err = result.unwrap_err();
    assert!(matches!(err, SegmentError::OracleTimeout { secs: 1 }));
    assert_eq!(err.kind(), ErrorKind::Oracle);
}

#[tokio::test]
async fn test_snapshot_resume_after_annotation() {
    skip_without_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let config = SegmentationConfig::builder()
        .image_format(ImageFormat::Jpeg)
        .build()
        .unwrap();

    let state: PipelineState<Section> =
        prepare(PipelineState::new(synthetic_pdf(3), "p"), &config).await.unwrap();
    assert!(state.page_images().iter().all(|img| img.starts_with(&[0xFF, 0xD8])));

    let path = dir.path().join("annotated.json");
    save_snapshot(&state, &path).await.unwrap();

    let resumed: PipelineState<Section> = load_snapshot(&path).await.unwrap();
    assert_eq!(resumed.stage(), Stage::Annotated);
    assert_eq!(resumed.annotated(), state.annotated());

    let resumed = respond(resumed, vec![section("all", 1, 3)]).unwrap();
    let done = segment(resumed, &config).await.unwrap();
    assert_eq!(
        count_pages(&PdfInput::Bytes(done.parsed()[0].pdf_bytes().to_vec())).unwrap(),
        3
    );
}

#[tokio::test]
async fn test_image_sequence_input() {
    skip_without_pdfium!();
    let images = vec![blank_page(120, 160), blank_page(160, 120)];
    let config = SegmentationConfig::default();
    let state = prepare(
        PipelineState::<Section>::new(PdfInput::Images(images), "p"),
        &config,
    )
    .await
    .unwrap();
    assert_eq!(state.annotated_pages(), 2);
    assert_eq!(state.page_images().len(), 2);
}
