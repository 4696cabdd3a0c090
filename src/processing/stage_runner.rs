/*!
 * Running one operation over one chunk.
 *
 * The runner renders the prompt, calls the inference client with a
 * per-call timeout, cleans the response and retries transient failures
 * with exponential backoff. It never returns an error: a chunk that keeps
 * failing is reported as `Failed` and the stage carries on.
 */

use log::{debug, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{ProviderConfig, RetryConfig};
use crate::errors::ProviderError;
use crate::processing::chunker::Chunk;
use crate::processing::operation::OperationSpec;
use crate::processing::progress::CancellationFlag;
use crate::providers::{InferenceClient, Prompt};

/// Default length of the context snippet passed between chunks
pub const DEFAULT_CONTEXT_CHARS: usize = 150;

/// Largest exponent applied to the backoff base
const MAX_BACKOFF_SHIFT: u32 = 10;

/// How a chunk ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Ok,
    Failed { reason: String },
    Skipped,
}

/// Outcome of running one operation on one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub stage_index: usize,
    pub chunk_index: usize,
    /// Cleaned model output; empty unless `status` is `Ok`
    pub output_text: String,
    pub status: StageStatus,
    /// Number of inference calls made
    pub attempts: u32,
}

impl StageResult {
    pub fn ok(stage_index: usize, chunk_index: usize, output_text: String, attempts: u32) -> Self {
        Self { stage_index, chunk_index, output_text, status: StageStatus::Ok, attempts }
    }

    pub fn failed(stage_index: usize, chunk_index: usize, reason: String, attempts: u32) -> Self {
        Self {
            stage_index,
            chunk_index,
            output_text: String::new(),
            status: StageStatus::Failed { reason },
            attempts,
        }
    }

    pub fn skipped(stage_index: usize, chunk_index: usize, attempts: u32) -> Self {
        Self { stage_index, chunk_index, output_text: String::new(), status: StageStatus::Skipped, attempts }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StageStatus::Ok
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, StageStatus::Failed { .. })
    }
}

/// Retry and timeout settings for inference calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following one
    pub backoff_base: Duration,
    /// Upper bound for a single call
    pub call_timeout: Duration,
    /// Add up to 25% random delay to each backoff
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(retry: &RetryConfig, provider: &ProviderConfig) -> Self {
        Self {
            max_retries: retry.retry_count,
            backoff_base: Duration::from_millis(retry.retry_backoff_ms),
            call_timeout: Duration::from_secs(provider.timeout_secs),
            jitter: true,
        }
    }

    /// A policy without delays, for tests and dry runs
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::ZERO,
            call_timeout: Duration::from_secs(30),
            jitter: false,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        let base_ms = self.backoff_base.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << shift);

        let jitter_ms = if self.jitter && delay_ms >= 4 {
            rand::rng().random_range(0..=delay_ms / 4)
        } else {
            0
        };

        Duration::from_millis(delay_ms + jitter_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), &ProviderConfig::default())
    }
}

/// Runs operations on chunks through an inference client
#[derive(Debug, Clone)]
pub struct StageRunner {
    client: Arc<dyn InferenceClient>,
    policy: RetryPolicy,
    context_chars: usize,
}

impl StageRunner {
    pub fn new(client: Arc<dyn InferenceClient>, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }

    pub fn with_context_chars(mut self, context_chars: usize) -> Self {
        self.context_chars = context_chars;
        self
    }

    pub fn client(&self) -> &Arc<dyn InferenceClient> {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` on `chunk`.
    ///
    /// `previous_output` is the output already produced for the chunk
    /// before this one; only continuity-sensitive kinds use it.
    pub async fn run(
        &self,
        stage_index: usize,
        chunk: &Chunk,
        operation: &OperationSpec,
        previous_output: Option<&str>,
        cancel: &CancellationFlag,
    ) -> StageResult {
        if chunk.text.trim().is_empty() {
            return StageResult::skipped(stage_index, chunk.index, 0);
        }

        let context = if operation.kind.is_continuity_sensitive() {
            previous_output
                .map(|output| tail_chars(output, self.context_chars))
                .filter(|snippet| !snippet.trim().is_empty())
        } else {
            None
        };
        let prompt = operation.build_prompt(&chunk.text, context);

        let mut attempts = 0;
        loop {
            if cancel.is_cancelled() {
                debug!("Chunk {} of stage {} skipped after cancellation", chunk.index + 1, stage_index);
                return StageResult::skipped(stage_index, chunk.index, attempts);
            }

            attempts += 1;
            match self.attempt(operation, &prompt).await {
                Ok(text) => return StageResult::ok(stage_index, chunk.index, text, attempts),
                Err(e) => {
                    let retries_left = attempts <= self.policy.max_retries;
                    if !e.is_retryable() || !retries_left {
                        warn!(
                            "Chunk {} of stage {} failed after {} attempt(s): {}",
                            chunk.index + 1, stage_index, attempts, e
                        );
                        return StageResult::failed(stage_index, chunk.index, e.to_string(), attempts);
                    }

                    let delay = self.policy.backoff_for(attempts);
                    warn!(
                        "Chunk {} of stage {} attempt {}/{} failed: {} (retrying in {:?})",
                        chunk.index + 1, stage_index, attempts, self.policy.max_retries + 1, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, operation: &OperationSpec, prompt: &Prompt) -> Result<String, ProviderError> {
        let call = self.client.generate(&operation.model, prompt, operation.temperature);
        let raw = match tokio::time::timeout(self.policy.call_timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProviderError::Timeout(format!(
                    "no response within {:?}",
                    self.policy.call_timeout
                )));
            }
        };

        let cleaned = operation.clean_output(&raw, &prompt.source_text);
        if cleaned.trim().is_empty() {
            return Err(ProviderError::MalformedResponse("empty response".to_string()));
        }
        Ok(cleaned)
    }
}

/// The last `n` characters of `text`
pub fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}
