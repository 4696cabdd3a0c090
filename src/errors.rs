/*!
 * Error types for the textwai application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when talking to an inference service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The request did not complete within the allowed time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The service could not be reached
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The requested model is not available on the service
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The service answered with something we could not use
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Any other failure while sending the request
    #[error("API request failed: {0}")]
    RequestFailed(String),
}

impl ProviderError {
    /// Whether another attempt may succeed.
    ///
    /// Transport and content failures are retried; a missing model or a
    /// rejected request will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_)
            | Self::ConnectionRefused(_)
            | Self::MalformedResponse(_)
            | Self::RequestFailed(_) => true,
            Self::ModelNotFound(_) => false,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
        }
    }
}

/// Errors raised by the pipeline engine
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid settings detected before any inference call
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An artifact could not be written
    #[error("Failed to persist {path:?}: {source}")]
    Persistence {
        /// Destination that could not be written
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Error from the inference service that aborts the run
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl PipelineError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the pipeline engine
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
