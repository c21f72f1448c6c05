//! Segmentation pipeline: the `Init → Annotated → OracleResponded → Segmented`
//! state machine.
//!
//! Every transition takes a [`PipelineState`] by value and returns the next
//! one. Calling a transition from the wrong stage fails with
//! [`SegmentError::InvalidTransition`] and leaves nothing half-done.
//!
//! pdfium work runs on the blocking thread pool. Range extraction fans out
//! per unit, bounded by [`SegmentationConfig::concurrency`], and is put back
//! into oracle order before it lands in the state.

use crate::config::{FailurePolicy, SegmentationConfig};
use crate::document::{self, PdfInput};
use crate::error::{SegmentError, UnitError};
use crate::oracle::{OracleRequest, SegmentOracle};
use crate::pipeline::{annotate, extract, input, raster};
use crate::progress::SegmentationProgressCallback;
use crate::prompts;
use crate::state::{HasPageRange, PageRange, ParsedUnit, PipelineState, Stage};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Init → Annotated.
///
/// Validates the source, stamps every page with its index and rasterises the
/// annotated document for the oracle.
pub async fn prepare<U>(
    mut state: PipelineState<U>,
    config: &SegmentationConfig,
) -> Result<PipelineState<U>, SegmentError> {
    state.expect_stage(Stage::Init, Stage::Annotated)?;
    notify(config, |cb| cb.on_stage_start(Stage::Annotated));
    let start = Instant::now();
    info!("Preparing {}", state.source.describe());

    let source = state.source.clone();
    let spec = config.anchor;
    let scale = config.render_scale;
    let format = config.image_format;

    let (resolved, annotated, pages, images) = blocking(move || {
        let resolved = input::resolve_input(source)?;
        let annotated = annotate::annotate(&resolved, &spec)?;
        let annotated_input = PdfInput::Bytes(annotated.clone());
        let pages = document::count_pages(&annotated_input)?;
        let images = raster::to_images(&annotated_input, scale, format)?;
        Ok((resolved, annotated, pages, images))
    })
    .await?;

    info!(
        "Annotated {} pages, {} images for the oracle in {}ms",
        pages,
        images.len(),
        start.elapsed().as_millis()
    );

    state.source = resolved;
    state.annotated = Some(annotated);
    state.annotated_pages = pages;
    state.page_images = images;
    state.stage = Stage::Annotated;
    notify(config, |cb| cb.on_stage_complete(Stage::Annotated));
    Ok(state)
}

/// Annotated → OracleResponded with units supplied by the caller.
///
/// Units are kept in the order given.
pub fn respond<U>(
    mut state: PipelineState<U>,
    units: Vec<U>,
) -> Result<PipelineState<U>, SegmentError> {
    state.expect_stage(Stage::Annotated, Stage::OracleResponded)?;
    debug!("Recorded {} oracle units", units.len());
    state.raw_output = units;
    state.stage = Stage::OracleResponded;
    Ok(state)
}

/// Annotated → OracleResponded by asking `oracle`.
///
/// The caller's prompt is extended with the marker and output instructions
/// for the configured anchor. The call is bounded by
/// [`SegmentationConfig::oracle_timeout_secs`].
pub async fn consult<U, O>(
    state: PipelineState<U>,
    oracle: &O,
    config: &SegmentationConfig,
) -> Result<PipelineState<U>, SegmentError>
where
    O: SegmentOracle<U>,
{
    state.expect_stage(Stage::Annotated, Stage::OracleResponded)?;
    notify(config, |cb| cb.on_stage_start(Stage::OracleResponded));

    let request = OracleRequest {
        prompt: prompts::build_segmentation_prompt(&state.prompt, config.anchor.anchor),
        images: state.page_images.clone(),
        mime: config.image_mime.clone(),
    };
    info!(
        "Consulting oracle with {} page images ({})",
        request.images.len(),
        request.mime
    );

    let start = Instant::now();
    let secs = config.oracle_timeout_secs;
    let units = tokio::time::timeout(Duration::from_secs(secs), oracle.respond(request))
        .await
        .map_err(|_| SegmentError::OracleTimeout { secs })??;
    info!(
        "Oracle returned {} units in {}ms",
        units.len(),
        start.elapsed().as_millis()
    );

    let state = respond(state, units)?;
    notify(config, |cb| cb.on_stage_complete(Stage::OracleResponded));
    Ok(state)
}

/// OracleResponded → Segmented.
///
/// Every unit's 1-based range is checked against the annotated page count,
/// converted to 0-based bounds and cut out of the annotated document. Under
/// [`FailurePolicy::FailFast`] the first failing unit (in unit order) aborts
/// the run; under [`FailurePolicy::SkipAndReport`] it is recorded in
/// [`PipelineState::unit_errors`] and the rest are kept.
pub async fn segment<U>(
    mut state: PipelineState<U>,
    config: &SegmentationConfig,
) -> Result<PipelineState<U>, SegmentError>
where
    U: HasPageRange + Clone,
{
    state.expect_stage(Stage::OracleResponded, Stage::Segmented)?;
    notify(config, |cb| cb.on_stage_start(Stage::Segmented));
    let start = Instant::now();

    let annotated = state
        .annotated
        .clone()
        .ok_or_else(|| SegmentError::Internal("annotated document missing from state".into()))?;
    let page_count = state.annotated_pages;
    let total_units = state.raw_output.len();
    let fail_fast = config.failure_policy == FailurePolicy::FailFast;

    let mut failures: Vec<(usize, SegmentError)> = Vec::new();
    let mut planned: Vec<(usize, PageRange)> = Vec::with_capacity(total_units);
    for (idx, unit) in state.raw_output.iter().enumerate() {
        match plan_unit(idx, unit, page_count) {
            Ok(range) => planned.push((idx, range)),
            Err(e) => {
                notify(config, |cb| cb.on_unit_error(idx, total_units, &e.to_string()));
                failures.push((idx, e));
            }
        }
    }

    // Under fail-fast only units before the first planning failure can
    // still produce an earlier error.
    if fail_fast {
        if let Some(&(cutoff, _)) = failures.first() {
            planned.retain(|(idx, _)| *idx < cutoff);
        }
    }

    let source = Arc::new(PdfInput::Bytes(annotated));
    let mut extractions = stream::iter(planned.into_iter().map(|(idx, range)| {
        let source = Arc::clone(&source);
        async move {
            let (start0, end0) = range.zero_based();
            let bytes = blocking(move || extract::extract(&source, start0, end0)).await;
            (idx, range, bytes.map_err(|e| e.for_unit(idx)))
        }
    }))
    .buffer_unordered(config.concurrency.max(1));

    let mut extracted: Vec<(usize, PageRange, Vec<u8>)> = Vec::with_capacity(total_units);
    while let Some((idx, range, result)) = extractions.next().await {
        match result {
            Ok(bytes) => {
                debug!("Unit {} (pages {}) → {} bytes", idx, range, bytes.len());
                notify(config, |cb| cb.on_unit_extracted(idx, total_units, bytes.len()));
                extracted.push((idx, range, bytes));
            }
            Err(e) => {
                notify(config, |cb| cb.on_unit_error(idx, total_units, &e.to_string()));
                failures.push((idx, e));
            }
        }
    }
    drop(extractions);

    failures.sort_by_key(|(idx, _)| *idx);
    if fail_fast && !failures.is_empty() {
        let (_, first) = failures.remove(0);
        return Err(first);
    }
    let unit_errors: Vec<UnitError> = failures
        .iter()
        .map(|(idx, e)| {
            warn!("Skipping unit {}: {}", idx, e);
            UnitError::from_error(*idx, e)
        })
        .collect();

    extracted.sort_by_key(|(idx, _, _)| *idx);
    state.parsed = extracted
        .into_iter()
        .map(|(idx, range, bytes)| ParsedUnit::new(state.raw_output[idx].clone(), range, bytes))
        .collect();
    state.unit_errors = unit_errors;
    state.stage = Stage::Segmented;

    info!(
        "Segmented {}/{} units in {}ms",
        state.parsed.len(),
        total_units,
        start.elapsed().as_millis()
    );
    notify(config, |cb| cb.on_stage_complete(Stage::Segmented));
    Ok(state)
}

/// Run all three transitions against `oracle`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf_segment::{run, LlmOracle, PageRange, SegmentationConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let oracle: LlmOracle<PageRange> = LlmOracle::from_env(None)?;
/// let config = SegmentationConfig::default();
/// let state = run("lecture.pdf", "Split the lecture into topics.", &oracle, &config).await?;
/// for unit in state.parsed() {
///     println!("{} → {} bytes", unit.page_range(), unit.pdf_bytes().len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn run<U, O>(
    source: impl Into<PdfInput>,
    prompt: impl Into<String>,
    oracle: &O,
    config: &SegmentationConfig,
) -> Result<PipelineState<U>, SegmentError>
where
    U: HasPageRange + Clone,
    O: SegmentOracle<U>,
{
    let state = PipelineState::new(source, prompt);
    let state = prepare(state, config).await?;
    let state = consult(state, oracle, config).await?;
    segment(state, config).await
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync<U, O>(
    source: impl Into<PdfInput>,
    prompt: impl Into<String>,
    oracle: &O,
    config: &SegmentationConfig,
) -> Result<PipelineState<U>, SegmentError>
where
    U: HasPageRange + Clone,
    O: SegmentOracle<U>,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| SegmentError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(source, prompt, oracle, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn plan_unit<U: HasPageRange>(
    idx: usize,
    unit: &U,
    page_count: usize,
) -> Result<PageRange, SegmentError> {
    let range = unit
        .page_range()
        .ok_or(SegmentError::MissingPageRange { unit: idx })
        .map_err(|e| e.for_unit(idx))?;
    range
        .validate(page_count)
        .map_err(|e| e.for_unit(idx))?;
    Ok(range)
}

async fn blocking<T, F>(f: F) -> Result<T, SegmentError>
where
    F: FnOnce() -> Result<T, SegmentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SegmentError::Internal(format!("spawn_blocking panicked: {}", e)))?
}

fn notify(config: &SegmentationConfig, f: impl FnOnce(&dyn SegmentationProgressCallback)) {
    if let Some(ref cb) = config.progress_callback {
        f(cb.as_ref());
    }
}
