//! The oracle boundary: page images + prompt in, ordered semantic units out.
//!
//! The pipeline only depends on the [`SegmentOracle`] trait. Any collaborator
//! that can map an [`OracleRequest`] to a list of units works: a VLM, a
//! human-in-the-loop UI, or a replay of a previous run.
//!
//! [`LlmOracle`] is the stock adapter over an `edgequake-llm` provider. It
//! sends one multimodal user message, retries transient provider failures
//! with exponential backoff and decodes the JSON answer into the caller's
//! unit type. Retries live here, not in the pipeline.

use crate::error::SegmentError;
use crate::pipeline::encode;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when a provider is resolved without an explicit model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// What the pipeline hands to the oracle.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Caller prompt, already extended with marker and output instructions.
    pub prompt: String,
    /// Annotated page images in page order.
    pub images: Vec<Vec<u8>>,
    /// MIME type of `images`.
    pub mime: String,
}

impl OracleRequest {
    /// `data:{mime};base64,…` URIs for every page image, in page order.
    pub fn data_uris(&self) -> Vec<String> {
        encode::to_data_uris(&self.images, &self.mime)
    }

    /// Page images as provider attachments.
    pub fn image_data(&self) -> Vec<ImageData> {
        self.images
            .iter()
            .map(|img| encode::to_image_data(img, &self.mime))
            .collect()
    }
}

/// External semantic-extraction collaborator.
///
/// Implementations return units in document order; the pipeline keeps that
/// order all the way to the parsed output.
pub trait SegmentOracle<U>: Send + Sync {
    fn respond(
        &self,
        request: OracleRequest,
    ) -> impl Future<Output = Result<Vec<U>, SegmentError>> + Send;
}

/// Tunables for [`LlmOracle`].
#[derive(Debug, Clone)]
pub struct LlmOracleOptions {
    /// Sampling temperature. Default: 0.0 (deterministic segmentation).
    pub temperature: f32,
    /// Maximum completion tokens. Default: 4096.
    pub max_tokens: usize,
    /// Retry attempts after the first failure. Default: 3.
    pub max_retries: u32,
    /// Initial backoff in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,
    /// Optional system message sent before the user turn.
    pub system_prompt: Option<String>,
}

impl Default for LlmOracleOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
        }
    }
}

/// [`SegmentOracle`] backed by an `edgequake-llm` vision provider.
pub struct LlmOracle<U> {
    provider: Arc<dyn LLMProvider>,
    options: LlmOracleOptions,
    _unit: PhantomData<fn() -> U>,
}

impl<U> Clone for LlmOracle<U> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            options: self.options.clone(),
            _unit: PhantomData,
        }
    }
}

impl<U> LlmOracle<U> {
    /// Wrap a pre-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            options: LlmOracleOptions::default(),
            _unit: PhantomData,
        }
    }

    /// Create a named provider (`"openai"`, `"anthropic"`, …) with `model`.
    pub fn named(provider_name: &str, model: &str) -> Result<Self, SegmentError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            SegmentError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider))
    }

    /// Resolve a provider from the environment.
    ///
    /// 1. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
    /// 2. OpenAI when `OPENAI_API_KEY` is set (model: `model` or [`DEFAULT_MODEL`])
    /// 3. `ProviderFactory::from_env` auto-detection
    pub fn from_env(model: Option<&str>) -> Result<Self, SegmentError> {
        if let (Ok(prov), Ok(env_model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !env_model.is_empty() {
                return Self::named(&prov, &env_model);
            }
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                return Self::named("openai", model.unwrap_or(DEFAULT_MODEL));
            }
        }

        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| SegmentError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                     Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                     Error: {}",
                    e
                ),
            })?;
        Ok(Self::new(provider))
    }

    pub fn with_options(mut self, options: LlmOracleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LlmOracleOptions {
        &self.options
    }

    fn build_messages(&self, request: &OracleRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = self.options.system_prompt {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user_with_images(
            request.prompt.as_str(),
            request.image_data(),
        ));
        messages
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.options.temperature),
            max_tokens: Some(self.options.max_tokens),
            ..Default::default()
        }
    }
}

impl<U: DeserializeOwned + Send> SegmentOracle<U> for LlmOracle<U> {
    async fn respond(&self, request: OracleRequest) -> Result<Vec<U>, SegmentError> {
        let start = Instant::now();
        let messages = self.build_messages(&request);
        let options = self.completion_options();
        let max_retries = self.options.max_retries;

        let mut last_err: Option<String> = None;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.options.retry_backoff_ms, attempt);
                warn!(
                    "Oracle: retry {}/{} after {}ms",
                    attempt, max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Oracle: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return parse_units(&response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Oracle: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(SegmentError::OracleFailed {
            retries: max_retries,
            message: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Delay before retry `attempt` (1-based): `base · 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

// ── Response decoding ────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```$").unwrap());

/// Remove a single code fence wrapping the whole answer, if present.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

#[derive(Deserialize)]
struct ItemList<U> {
    items: Vec<U>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UnitPayload<U> {
    Wrapped(ItemList<U>),
    Bare(Vec<U>),
}

/// Decode an oracle answer: `{"items": [...]}` or a bare JSON array,
/// optionally wrapped in a code fence.
pub fn parse_units<U: DeserializeOwned>(content: &str) -> Result<Vec<U>, SegmentError> {
    let body = strip_code_fences(content);
    let payload: UnitPayload<U> =
        serde_json::from_str(body).map_err(|e| SegmentError::MalformedOracleOutput {
            detail: format!("{} (response starts with {:?})", e, preview(body)),
        })?;
    Ok(match payload {
        UnitPayload::Wrapped(list) => list.items,
        UnitPayload::Bare(items) => items,
    })
}

fn preview(s: &str) -> String {
    s.chars().take(60).collect()
}
