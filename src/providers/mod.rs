/*!
 * Inference clients used by the pipeline.
 *
 * This module contains the client abstraction and its implementations:
 * - Ollama: Local LLM server over HTTP
 * - Mock: In-process client for dry runs and tests
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// A fully rendered request for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    /// Instructions sent as the system message
    pub system: String,

    /// The user message, which embeds the chunk text
    pub user: String,

    /// The raw chunk text the prompt was built from
    pub source_text: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            source_text: source_text.into(),
        }
    }
}

/// Common trait for all inference services
///
/// Every call is atomic: a complete prompt goes in and the complete
/// generated text comes out. Implementations are shared between
/// concurrent workers and must be `Send + Sync`.
#[async_trait]
pub trait InferenceClient: Send + Sync + Debug {
    /// Generate a completion for `prompt` with the given model
    ///
    /// # Arguments
    /// * `model` - Model identifier understood by the service
    /// * `prompt` - System and user messages
    /// * `temperature` - Sampling temperature
    async fn generate(&self, model: &str, prompt: &Prompt, temperature: f32) -> Result<String, ProviderError>;

    /// Models the service can serve, or `None` when it cannot tell
    async fn list_models(&self) -> Result<Option<Vec<String>>, ProviderError>;

    /// Test the connection to the service
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Whether `model` is among `available`, treating a missing tag as `:latest`
pub fn model_is_available(available: &[String], model: &str) -> bool {
    let with_default_tag = |name: &str| {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{}:latest", name)
        }
    };
    let wanted = with_default_tag(model);
    available.iter().any(|name| with_default_tag(name) == wanted)
}

pub mod ollama;
pub mod mock;
