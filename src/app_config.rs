use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::file_utils::OutputLayout;
use crate::language_utils::resolve_language;
use crate::processing::chunker::ChunkingOptions;
use crate::processing::dedup::DedupGranularity;
use crate::processing::operation::{
    OperationKind, OperationSpec, OptionValue, PipelineSpec, SOURCE_LANGUAGE, TARGET_LANGUAGE,
};
use crate::processing::prompts::PromptOverrides;
use crate::processing::stage_runner::{RetryPolicy, DEFAULT_CONTEXT_CHARS};

/// Application configuration module
/// This module handles loading, validating and saving `conf.json`.
/// Every field has a default, so partial files are accepted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Inference service settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Retry settings for failed inference calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Chunking settings
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Overlap deduplication settings
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Operations in pipeline order
    #[serde(default = "default_operations")]
    pub operations: Vec<OperationConfig>,

    /// Where and how artifacts are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Inference service configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    // @field: Service URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    // @field: Timeout seconds for one inference call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Max concurrent requests within one stage
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    // @field: Model used when no operation names one
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            concurrent_requests: default_concurrent_requests(),
            default_model: default_model(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first failed attempt
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff in milliseconds, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// A named chunk size and overlap pair
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChunkPreset {
    pub name: String,
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkPreset {
    fn new(name: &str, chunk_size: usize, overlap: usize) -> Self {
        Self { name: name.to_string(), chunk_size, overlap }
    }
}

/// Chunking configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    #[serde(default = "default_presets")]
    pub presets: Vec<ChunkPreset>,

    /// Index into `presets` used when no explicit size is given
    #[serde(default = "default_preset_index")]
    pub default_preset: usize,

    /// Explicit chunk size; overrides the preset
    #[serde(default)]
    pub chunk_size: Option<usize>,

    /// Explicit overlap; overrides the preset
    #[serde(default)]
    pub overlap: Option<usize>,

    /// Texts up to this length are not split; defaults to the chunk size
    #[serde(default)]
    pub small_file_threshold: Option<usize>,

    #[serde(default)]
    pub search_radius: Option<usize>,

    /// Send each text as a single chunk
    #[serde(default)]
    pub process_entire_file: bool,

    /// Characters of previous output passed to continuation prompts
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            presets: default_presets(),
            default_preset: default_preset_index(),
            chunk_size: None,
            overlap: None,
            small_file_threshold: None,
            search_radius: None,
            process_entire_file: false,
            context_chars: default_context_chars(),
        }
    }
}

impl ChunkingConfig {
    /// The selected preset, if the index is valid
    pub fn preset(&self) -> Option<&ChunkPreset> {
        self.presets.get(self.default_preset)
    }

    /// Chunk size and overlap after applying explicit values over the preset
    pub fn effective_sizes(&self) -> Result<(usize, usize)> {
        let preset = self.preset();
        let chunk_size = self
            .chunk_size
            .or(preset.map(|p| p.chunk_size))
            .ok_or_else(|| anyhow!("No chunk size set and preset {} does not exist", self.default_preset))?;
        let overlap = self
            .overlap
            .or(preset.map(|p| p.overlap))
            .ok_or_else(|| anyhow!("No overlap set and preset {} does not exist", self.default_preset))?;
        Ok((chunk_size, overlap))
    }
}

/// Deduplication configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct DedupConfig {
    #[serde(default)]
    pub granularity: DedupGranularity,
}

/// One operation as written in the config file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OperationConfig {
    pub kind: OperationKind,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Empty means: inherit
    #[serde(default)]
    pub model: String,

    /// Empty means: the kind's default
    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,

    #[serde(default)]
    pub prompts: PromptOverrides,

    /// Remove repeated overlap between chunk outputs
    #[serde(default = "default_true")]
    pub deduplicate: bool,
}

impl OperationConfig {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            enabled: true,
            model: String::new(),
            temperature: None,
            options: BTreeMap::new(),
            prompts: PromptOverrides::default(),
            deduplicate: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }
}

/// Output configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Output directory; next to each source file when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Appended to the source file stem
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            suffix: default_suffix(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_model() -> String {
    "mistral:latest".to_string()
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // doubled on each retry
}

fn default_presets() -> Vec<ChunkPreset> {
    vec![
        ChunkPreset::new("Small", 1500, 150),
        ChunkPreset::new("Medium", 2500, 200),
        ChunkPreset::new("Large", 5000, 300),
        ChunkPreset::new("Extra Large", 10000, 500),
    ]
}

fn default_preset_index() -> usize {
    1
}

fn default_context_chars() -> usize {
    DEFAULT_CONTEXT_CHARS
}

fn default_suffix() -> String {
    "_processed".to_string()
}

fn default_true() -> bool {
    true
}

fn default_operations() -> Vec<OperationConfig> {
    vec![
        OperationConfig::new(OperationKind::Translate)
            .with_option(SOURCE_LANGUAGE, "en")
            .with_option(TARGET_LANGUAGE, "cs"),
        OperationConfig::new(OperationKind::Audiobook).disabled(),
        OperationConfig::new(OperationKind::Paraphrase).disabled(),
    ]
}

impl Config {
    /// Read a config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Write the config as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if !self.chunking.process_entire_file {
            let (chunk_size, overlap) = self.chunking.effective_sizes()?;
            if chunk_size == 0 {
                return Err(anyhow!("Chunk size must be greater than zero"));
            }
            if overlap >= chunk_size {
                return Err(anyhow!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    overlap,
                    chunk_size
                ));
            }
        }

        if self.provider.concurrent_requests == 0 {
            return Err(anyhow!("concurrent_requests must be at least 1"));
        }

        for (i, op) in self.operations.iter().enumerate() {
            if let Some(temperature) = op.temperature {
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(anyhow!(
                        "Operation {} ({}) temperature {} is outside 0.0..=2.0",
                        i + 1,
                        op.kind,
                        temperature
                    ));
                }
            }

            if op.enabled && op.kind == OperationKind::Translate {
                for key in [SOURCE_LANGUAGE, TARGET_LANGUAGE] {
                    if let Some(OptionValue::Text(value)) = op.options.get(key) {
                        resolve_language(value)
                            .with_context(|| format!("Operation {} ({}) has an invalid {}", i + 1, op.kind, key))?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Chunking options derived from the chunking section
    pub fn chunking_options(&self) -> Result<ChunkingOptions> {
        let (chunk_size, overlap) = if self.chunking.process_entire_file {
            self.chunking.effective_sizes().unwrap_or((usize::MAX, 0))
        } else {
            self.chunking.effective_sizes()?
        };

        let mut options = ChunkingOptions::new(chunk_size, overlap).entire_file(self.chunking.process_entire_file);
        if let Some(threshold) = self.chunking.small_file_threshold {
            options = options.with_small_file_threshold(threshold);
        }
        if let Some(radius) = self.chunking.search_radius {
            options = options.with_search_radius(radius);
        }
        Ok(options)
    }

    /// Build the pipeline from the enabled operations.
    ///
    /// Operations without a model inherit the first operation's model, or
    /// the provider default when none is set. Audiobook and paraphrase
    /// operations with nothing enabled are left out.
    pub fn pipeline(&self) -> PipelineSpec {
        let first_model = self
            .operations
            .iter()
            .filter(|op| op.enabled)
            .map(|op| op.model.trim())
            .find(|model| !model.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.provider.default_model.clone());

        let operations = self
            .operations
            .iter()
            .filter(|op| op.enabled)
            .map(|op| {
                let model = if op.model.trim().is_empty() {
                    first_model.clone()
                } else {
                    op.model.trim().to_string()
                };
                let mut spec = OperationSpec::new(op.kind, model)
                    .with_prompts(op.prompts.clone())
                    .with_deduplicate(op.deduplicate);
                if let Some(temperature) = op.temperature {
                    spec = spec.with_temperature(temperature);
                }
                spec.options = op.options.clone();
                spec
            })
            .collect();

        PipelineSpec::new(operations).without_idle_operations()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.retry, &self.provider)
    }

    pub fn output_layout(&self) -> OutputLayout {
        OutputLayout::new(self.output.directory.clone(), self.output.suffix.clone())
    }

    /// Set the model of every enabled operation
    pub fn override_model(&mut self, model: &str) {
        for op in self.operations.iter_mut().filter(|op| op.enabled) {
            op.model = model.to_string();
        }
        self.provider.default_model = model.to_string();
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: ProviderConfig::default(),
            retry: RetryConfig::default(),
            chunking: ChunkingConfig::default(),
            dedup: DedupConfig::default(),
            operations: default_operations(),
            output: OutputConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
