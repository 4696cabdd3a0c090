/*!
 * Mock inference client for dry runs and testing.
 *
 * The client simulates different behaviors:
 * - `MockClient::echo()` - Always succeeds and returns the chunk unchanged
 * - `MockClient::intermittent(n)` - Fails every n-th request
 * - `MockClient::failing()` - Always fails with an error
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{InferenceClient, Prompt};

/// Behavior mode for the mock client
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Returns the chunk text unchanged (or the custom response)
    Echo,
    /// Always fails with the given error
    Failing(ProviderError),
    /// Fails with the given error when the chunk contains the marker
    FailOnInput { marker: String, error: ProviderError },
    /// Fails every Nth request with a 503
    Intermittent { fail_every: usize },
    /// Echoes after a fixed delay
    Slow { delay_ms: u64 },
    /// Echoes after a delay that shrinks with each request, so earlier
    /// requests finish later
    Staggered { step_ms: u64, requests: usize },
    /// Returns an empty response
    Empty,
}

/// Mock client for testing pipeline behavior
#[derive(Debug, Clone)]
pub struct MockClient {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Every prompt received, in arrival order
    prompts: Arc<Mutex<Vec<Prompt>>>,
    /// Custom response generator (optional)
    custom_response: Option<fn(&Prompt) -> String>,
    /// Models reported by `list_models`; `None` means unknown
    models: Option<Vec<String>>,
}

impl MockClient {
    /// Create a new mock client with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            custom_response: None,
            models: None,
        }
    }

    /// A client that returns every chunk unchanged
    pub fn echo() -> Self {
        Self::new(MockBehavior::Echo)
    }

    /// A client that always fails with a 500
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing(ProviderError::ApiError {
            status_code: 500,
            message: "Simulated provider failure".to_string(),
        }))
    }

    /// A client that always fails with `error`
    pub fn failing_with(error: ProviderError) -> Self {
        Self::new(MockBehavior::Failing(error))
    }

    /// A client that fails with a timeout for chunks containing `marker`
    pub fn fail_on_input(marker: impl Into<String>) -> Self {
        Self::new(MockBehavior::FailOnInput {
            marker: marker.into(),
            error: ProviderError::Timeout("Simulated timeout".to_string()),
        })
    }

    /// A client that fails every `fail_every`-th request
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every: fail_every.max(1) })
    }

    /// A client that waits `delay_ms` before echoing
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// A client whose first requests finish last
    pub fn staggered(step_ms: u64, requests: usize) -> Self {
        Self::new(MockBehavior::Staggered { step_ms, requests })
    }

    /// A client that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Set a custom response generator used instead of echoing
    pub fn with_custom_response(mut self, generator: fn(&Prompt) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Report these models from `list_models`
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Number of `generate` calls received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }

    fn respond(&self, prompt: &Prompt) -> String {
        match self.custom_response {
            Some(generator) => generator(prompt),
            None => prompt.source_text.clone(),
        }
    }
}

#[async_trait]
impl InferenceClient for MockClient {
    async fn generate(&self, _model: &str, prompt: &Prompt, _temperature: f32) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.clone());

        match &self.behavior {
            MockBehavior::Echo => Ok(self.respond(prompt)),

            MockBehavior::Failing(error) => Err(error.clone()),

            MockBehavior::FailOnInput { marker, error } => {
                if prompt.source_text.contains(marker.as_str()) {
                    Err(error.clone())
                } else {
                    Ok(self.respond(prompt))
                }
            }

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(self.respond(prompt))
                }
            }

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Ok(self.respond(prompt))
            }

            MockBehavior::Staggered { step_ms, requests } => {
                let remaining = requests.saturating_sub(count) as u64;
                tokio::time::sleep(Duration::from_millis(step_ms * remaining)).await;
                Ok(self.respond(prompt))
            }

            MockBehavior::Empty => Ok(String::new()),
        }
    }

    async fn list_models(&self) -> Result<Option<Vec<String>>, ProviderError> {
        Ok(self.models.clone())
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match &self.behavior {
            MockBehavior::Failing(error) => Err(error.clone()),
            _ => Ok(()),
        }
    }
}
