/*!
 * # textwai - chunked text processing with local LLMs
 *
 * A Rust library that runs long texts through a pipeline of LLM
 * operations: translation, paraphrasing and audiobook preparation.
 *
 * ## Features
 *
 * - Boundary-aware chunking with overlap
 * - Sequential multi-step pipelines with one artifact per step
 * - Retries with exponential backoff for transient inference failures
 * - Deduplication of overlapping output when chunks are merged
 * - Bounded parallelism for operations that need no cross-chunk context
 * - Cooperative cancellation and progress reporting
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `processing`: The pipeline itself:
 *   - `processing::chunker`: Splitting texts into chunks
 *   - `processing::stage_runner`: One operation on one chunk
 *   - `processing::dedup`: Merging chunk outputs
 *   - `processing::executor`: One document through all steps
 *   - `processing::batch`: Many documents
 * - `file_utils`: File system operations and artifact naming
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `providers`: Inference clients:
 *   - `providers::ollama`: Ollama API client
 *   - `providers::mock`: In-process client for dry runs and tests
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod processing;
pub mod providers;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{AppError, PipelineError, ProviderError};
pub use language_utils::{get_language_name, normalize_to_part2t, resolve_language};
pub use processing::{BatchOrchestrator, ChunkingOptions, Document, OperationSpec, PipelineExecutor, PipelineSpec};
pub use providers::{InferenceClient, Prompt};
