use anyhow::{anyhow, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::processing::batch::{BatchJob, BatchOrchestrator, BatchSummary, FileOutcome, FileStatus};
use crate::processing::dedup::Reassembler;
use crate::processing::document::Document;
use crate::processing::executor::PipelineExecutor;
use crate::processing::progress::{CancellationFlag, ProgressEvent, ProgressSink, ProgressUpdate};
use crate::providers::InferenceClient;
use crate::providers::mock::MockClient;
use crate::providers::ollama::Ollama;

// @module: Application controller for batch text processing

/// Main application controller
#[derive(Debug)]
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Shared inference client
    client: Arc<dyn InferenceClient>,

    // @field: Draw progress bars
    show_progress: bool,
}

impl Controller {
    /// Create a controller talking to the configured Ollama endpoint
    pub fn with_config(config: Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.provider.timeout_secs);
        let client = Ollama::new(&config.provider.endpoint, timeout)
            .context("Failed to create Ollama client")?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    /// Create a controller whose client echoes every chunk back; no network
    pub fn dry_run(config: Config) -> Self {
        Self::with_client(config, Arc::new(MockClient::echo()))
    }

    // @method: Create a controller around an existing client
    pub fn with_client(config: Config, client: Arc<dyn InferenceClient>) -> Self {
        Self {
            config,
            client,
            show_progress: true,
        }
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Assemble an executor from the configuration
    pub fn build_executor(&self) -> Result<PipelineExecutor> {
        let chunking = self.config.chunking_options()?;
        Ok(PipelineExecutor::new(Arc::clone(&self.client), self.config.retry_policy(), chunking)
            .with_reassembler(Reassembler::new(self.config.dedup.granularity))
            .with_layout(self.config.output_layout())
            .with_concurrency(self.config.provider.concurrent_requests)
            .with_context_chars(self.config.chunking.context_chars))
    }

    /// Expand the given paths into text files; directories are walked recursively
    pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in paths {
            if FileManager::dir_exists(path) {
                let found = FileManager::find_text_files(path)?;
                if found.is_empty() {
                    warn!("No text files found in directory: {}", path.display());
                }
                files.extend(found);
            } else if FileManager::file_exists(path) {
                files.push(path.clone());
            } else {
                return Err(anyhow!("Input path does not exist: {}", path.display()));
            }
        }
        files.dedup();
        Ok(files)
    }

    /// Split inputs into the ones to process and the ones whose final output exists
    pub fn partition_existing(&self, files: Vec<PathBuf>, force_overwrite: bool) -> (Vec<PathBuf>, Vec<PathBuf>) {
        if force_overwrite {
            return (files, Vec::new());
        }
        let layout = self.config.output_layout();
        files
            .into_iter()
            .partition(|file| !FileManager::file_exists(layout.final_path(file)))
    }

    /// Process every input and return the batch summary
    pub async fn run(&self, inputs: &[PathBuf], force_overwrite: bool, cancel: &CancellationFlag) -> Result<BatchSummary> {
        let start_time = std::time::Instant::now();

        let files = Self::collect_inputs(inputs)?;
        if files.is_empty() {
            return Err(anyhow!("No text files to process"));
        }

        let (pending, existing) = self.partition_existing(files, force_overwrite);
        for file in &existing {
            warn!("Skipping {}, output already exists (use -f to force overwrite)", file.display());
        }

        let pipeline = self.config.pipeline();
        if pipeline.is_empty() {
            warn!("No operations enabled; outputs will be copies of the inputs");
        } else {
            let kinds: Vec<String> = pipeline.operations().iter().map(|op| op.kind.to_string()).collect();
            info!("Pipeline: {}", kinds.join(" -> "));
        }

        let mut documents = Vec::with_capacity(pending.len());
        let mut load_failures = Vec::new();
        for file in pending {
            match Document::load(&file) {
                Ok(document) => documents.push(document),
                Err(e) => load_failures.push((file, format!("{:#}", e))),
            }
        }

        let mut job = BatchJob::new(documents, pipeline);
        for (file, reason) in &load_failures {
            warn!("Cannot read {}: {}", file.display(), reason);
            job.record_failure(file, reason.clone());
        }

        let orchestrator = BatchOrchestrator::new(self.build_executor()?);
        let (sink, receiver) = if self.show_progress {
            let (sink, receiver) = ProgressSink::channel();
            (sink, Some(receiver))
        } else {
            (ProgressSink::disabled(), None)
        };
        let progress_task = receiver.map(|receiver| tokio::spawn(Self::drive_progress(receiver)));

        orchestrator.run(&mut job, cancel, &sink).await;

        drop(sink);
        if let Some(task) = progress_task {
            if let Err(e) = task.await {
                debug!("Progress display ended abnormally: {}", e);
            }
        }

        let mut summary = job.summary();
        summary.skipped += existing.len();

        for outcome in job.outcomes() {
            if let Err(e) = self.write_issues(outcome) {
                warn!("Failed to write issues log: {}", e);
            }
        }

        info!(
            "Processing completed in {}: {} succeeded, {} partial ({} chunk(s) degraded), {} failed, {} cancelled, {} skipped",
            Self::format_duration(start_time.elapsed()),
            summary.succeeded,
            summary.partially_succeeded,
            summary.degraded_chunks,
            summary.failed,
            summary.cancelled,
            summary.skipped
        );

        Ok(summary)
    }

    /// Models reported by the inference service
    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.client
            .test_connection()
            .await
            .with_context(|| format!("Cannot reach inference service at {}", self.config.provider.endpoint))?;
        let models = self.client.list_models().await?;
        Ok(models.unwrap_or_default())
    }

    /// Append degraded chunks, dedup notes and failures to the issues log
    fn write_issues(&self, outcome: &FileOutcome) -> Result<()> {
        let mut lines = Vec::new();
        match &outcome.status {
            FileStatus::Completed(run) => {
                for report in &run.stage_reports {
                    for (chunk, reason) in &report.failures {
                        lines.push(format!(
                            "step {} ({}): chunk {} kept original text: {}",
                            report.step, report.tag, chunk + 1, reason
                        ));
                    }
                    for note in &report.notes {
                        lines.push(format!("step {} ({}): {}", report.step, report.tag, note.message));
                    }
                }
            }
            FileStatus::Failed(reason) => lines.push(format!("failed: {}", reason)),
            FileStatus::Skipped => {}
        }

        if lines.is_empty() {
            return Ok(());
        }

        let log_path = self.config.output_layout().issues_log_path(&outcome.source);
        for line in lines {
            FileManager::append_to_log_file(&log_path, &format!("{}: {}", outcome.source.display(), line))?;
        }
        info!("Issues for {} written to {}", display_name(&outcome.source), log_path.display());
        Ok(())
    }

    /// Render progress updates until the sending side is dropped
    async fn drive_progress(mut receiver: UnboundedReceiver<ProgressUpdate>) {
        let multi_progress = MultiProgress::new();

        let files_bar = multi_progress.add(ProgressBar::new(0));
        files_bar.set_style(Self::bar_style("files"));
        files_bar.set_message("Processing files");

        let chunks_bar = multi_progress.add(ProgressBar::new(0));
        chunks_bar.set_style(Self::bar_style("chunks"));

        while let Some(update) = receiver.recv().await {
            files_bar.set_length(update.total_files as u64);
            files_bar.set_position(update.files_done() as u64);

            match update.event {
                ProgressEvent::FileStarted => {
                    chunks_bar.reset();
                    chunks_bar.set_length(0);
                }
                ProgressEvent::ChunkCompleted => {
                    chunks_bar.set_length(update.total_chunks as u64);
                    chunks_bar.set_position(update.chunk_index as u64);
                    chunks_bar.set_message(format!("step {}/{}", update.stage_index, update.total_stages));
                }
                ProgressEvent::FileFinished => {}
            }
        }

        chunks_bar.finish_and_clear();
        files_bar.finish_with_message("Processing complete");
    }

    fn bar_style(unit: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}} {{eta}}",
                unit
            ))
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
