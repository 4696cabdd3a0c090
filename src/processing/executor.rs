/*!
 * Per-file pipeline execution.
 *
 * The executor drives one document through every stage of a pipeline:
 * chunk the current text, run the stage on each chunk, merge the outputs
 * and persist them as a step artifact, then feed the merged text into the
 * next stage. After the last stage the final artifact is written.
 *
 * Configuration problems are detected before any inference call. Chunk
 * failures never abort a run; they degrade the affected chunk and are
 * reported in the outcome. Cancellation stops the run at the next stage
 * or chunk boundary without persisting the interrupted stage.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::PipelineError;
use crate::file_utils::{FileManager, OutputLayout};
use crate::processing::chunker::{self, Chunk, ChunkingOptions};
use crate::processing::dedup::{DedupNote, MergedStage, Reassembler};
use crate::processing::document::Document;
use crate::processing::operation::{OperationSpec, PipelineSpec};
use crate::processing::progress::{CancellationFlag, ProgressEvent, ProgressSink, ProgressUpdate};
use crate::processing::stage_runner::{RetryPolicy, StageResult, StageRunner};
use crate::providers::{InferenceClient, model_is_available};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Chunking,
    RunningStage(usize),
    Merging(usize),
    Persisting,
    Done,
    Cancelled,
    FailedFatal,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Chunking => write!(f, "chunking"),
            Self::RunningStage(step) => write!(f, "running stage {}", step),
            Self::Merging(step) => write!(f, "merging stage {}", step),
            Self::Persisting => write!(f, "persisting"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::FailedFatal => write!(f, "failed"),
        }
    }
}

/// Summary of one completed stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub step: usize,
    pub tag: String,
    pub chunk_count: usize,
    pub degraded_chunks: Vec<usize>,
    pub failures: Vec<(usize, String)>,
    pub notes: Vec<DedupNote>,
    pub artifact: PathBuf,
}

/// Overall result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    PartiallySucceeded { degraded_chunks: usize },
    Cancelled { completed_stages: usize },
}

/// What a run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Step artifacts followed by the final artifact, in write order
    pub artifacts: Vec<PathBuf>,
    pub stage_reports: Vec<StageReport>,
    /// `None` when the run was cancelled
    pub final_output: Option<PathBuf>,
}

impl RunOutcome {
    /// Chunks degraded across all completed stages
    pub fn degraded_chunks(&self) -> usize {
        self.stage_reports.iter().map(|r| r.degraded_chunks.len()).sum()
    }
}

/// Position of the current file inside a batch, for progress updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePosition {
    pub index: usize,
    pub total: usize,
}

impl Default for FilePosition {
    fn default() -> Self {
        Self { index: 1, total: 1 }
    }
}

/// Mutable state of a single run
struct PipelineRun<'a> {
    document: &'a Document,
    pipeline: &'a PipelineSpec,
    state: RunState,
    current_stage: usize,
    cumulative_text: String,
    artifacts: Vec<PathBuf>,
    stage_reports: Vec<StageReport>,
}

impl<'a> PipelineRun<'a> {
    fn new(document: &'a Document, pipeline: &'a PipelineSpec) -> Self {
        Self {
            document,
            pipeline,
            state: RunState::Idle,
            current_stage: 0,
            cumulative_text: document.text().to_string(),
            artifacts: Vec::new(),
            stage_reports: Vec::new(),
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!(
            "{} (step {}): {} -> {}",
            self.document.display_name(),
            self.current_stage,
            self.state,
            next
        );
        self.state = next;
    }

    fn record_stage(&mut self, report: StageReport, text: String) {
        self.artifacts.push(report.artifact.clone());
        self.stage_reports.push(report);
        self.cumulative_text = text;
    }

    fn into_outcome(self, final_output: Option<PathBuf>) -> RunOutcome {
        let degraded: usize = self.stage_reports.iter().map(|r| r.degraded_chunks.len()).sum();
        let status = match self.state {
            RunState::Cancelled => RunStatus::Cancelled {
                completed_stages: self.stage_reports.len(),
            },
            _ if degraded > 0 => RunStatus::PartiallySucceeded { degraded_chunks: degraded },
            _ => RunStatus::Succeeded,
        };

        let mut artifacts = self.artifacts;
        if let Some(path) = &final_output {
            artifacts.push(path.clone());
        }

        RunOutcome {
            status,
            artifacts,
            stage_reports: self.stage_reports,
            final_output,
        }
    }
}

/// Runs pipelines over documents
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    runner: StageRunner,
    chunking: ChunkingOptions,
    reassembler: Reassembler,
    layout: OutputLayout,
    max_concurrent: usize,
}

impl PipelineExecutor {
    pub fn new(client: Arc<dyn InferenceClient>, policy: RetryPolicy, chunking: ChunkingOptions) -> Self {
        Self {
            runner: StageRunner::new(client, policy),
            chunking,
            reassembler: Reassembler::default(),
            layout: OutputLayout::default(),
            max_concurrent: 1,
        }
    }

    pub fn with_reassembler(mut self, reassembler: Reassembler) -> Self {
        self.reassembler = reassembler;
        self
    }

    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Width of the worker pool for continuity-independent stages
    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_context_chars(mut self, context_chars: usize) -> Self {
        self.runner = self.runner.with_context_chars(context_chars);
        self
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn chunking(&self) -> &ChunkingOptions {
        &self.chunking
    }

    /// Checks that must pass before any inference call
    pub async fn preflight(&self, pipeline: &PipelineSpec) -> Result<(), PipelineError> {
        self.chunking.validate()?;

        for (step, operation) in pipeline.steps() {
            if operation.model.trim().is_empty() {
                return Err(PipelineError::config(format!("step {} ({}) has no model", step, operation.kind)));
            }
            if !operation.is_runnable() {
                return Err(PipelineError::config(format!(
                    "step {} ({}) has no sub-operations enabled",
                    step, operation.kind
                )));
            }
            if !(0.0..=2.0).contains(&operation.temperature) {
                return Err(PipelineError::config(format!(
                    "step {} temperature {} is outside 0.0..=2.0",
                    step, operation.temperature
                )));
            }
        }

        if pipeline.is_empty() {
            return Ok(());
        }

        if let Some(available) = self.runner.client().list_models().await? {
            for (step, operation) in pipeline.steps() {
                if !model_is_available(&available, &operation.model) {
                    return Err(PipelineError::config(format!(
                        "model '{}' for step {} is not available (found: {})",
                        operation.model,
                        step,
                        available.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }

    /// Run every stage of `pipeline` over `document`
    pub async fn run(
        &self,
        document: &Document,
        pipeline: &PipelineSpec,
        position: FilePosition,
        cancel: &CancellationFlag,
        progress: &ProgressSink,
    ) -> Result<RunOutcome, PipelineError> {
        let mut run = PipelineRun::new(document, pipeline);

        if let Err(e) = self.preflight(pipeline).await {
            run.transition(RunState::FailedFatal);
            error!("{}: {}", document.display_name(), e);
            return Err(e);
        }

        for (step, operation) in pipeline.steps() {
            if cancel.is_cancelled() {
                run.transition(RunState::Cancelled);
                return Ok(run.into_outcome(None));
            }

            run.current_stage = step;
            run.transition(RunState::Chunking);
            let chunks = chunker::split(&run.cumulative_text, &self.chunking).inspect_err(|_| {
                run.transition(RunState::FailedFatal);
            })?;

            info!(
                "{}: step {}/{} {} on {} chunk(s)",
                document.display_name(),
                step,
                run.pipeline.len(),
                operation.kind.display_name(),
                chunks.len()
            );

            run.transition(RunState::RunningStage(step));
            let results = self
                .run_stage(step, operation, &chunks, position, run.pipeline.len(), cancel, progress)
                .await;

            if cancel.is_cancelled() {
                warn!(
                    "{}: step {} interrupted by cancellation; not persisted",
                    document.display_name(),
                    step
                );
                run.transition(RunState::Cancelled);
                return Ok(run.into_outcome(None));
            }

            run.transition(RunState::Merging(step));
            let merged = if operation.deduplicate {
                self.reassembler.merge(&chunks, results)
            } else {
                self.reassembler.concatenate(&chunks, results)
            };
            let artifact = self.layout.step_path(document.id(), step, &operation.step_tag());
            self.persist(&mut run, &artifact, &merged.text)?;

            if merged.is_degraded() {
                warn!(
                    "{}: step {} kept the original text for {} chunk(s)",
                    document.display_name(),
                    step,
                    merged.degraded_chunks.len()
                );
            }
            for note in &merged.notes {
                debug!("{}: step {}: {}", document.display_name(), step, note.message);
            }

            let report = Self::report(step, operation, chunks.len(), &merged, artifact);
            run.record_stage(report, merged.text);
        }

        run.transition(RunState::Persisting);
        let final_path = self.layout.final_path(document.id());
        let final_text = std::mem::take(&mut run.cumulative_text);
        self.persist(&mut run, &final_path, &final_text)?;

        run.transition(RunState::Done);
        Ok(run.into_outcome(Some(final_path)))
    }

    fn persist(&self, run: &mut PipelineRun<'_>, path: &std::path::Path, text: &str) -> Result<(), PipelineError> {
        FileManager::write_atomic(path, text).inspect_err(|e| {
            error!("{}: {}", run.document.display_name(), e);
            run.transition(RunState::FailedFatal);
        })
    }

    fn report(step: usize, operation: &OperationSpec, chunk_count: usize, merged: &MergedStage, artifact: PathBuf) -> StageReport {
        StageReport {
            step,
            tag: operation.step_tag(),
            chunk_count,
            degraded_chunks: merged.degraded_chunks.clone(),
            failures: merged.failures.clone(),
            notes: merged.notes.clone(),
            artifact,
        }
    }

    /// Run one stage over all chunks.
    ///
    /// Continuity-sensitive operations go chunk by chunk, each seeing the
    /// previous output; the rest share a bounded worker pool and are put
    /// back in chunk order afterwards.
    #[allow(clippy::too_many_arguments)]
    async fn run_stage(
        &self,
        step: usize,
        operation: &OperationSpec,
        chunks: &[Chunk],
        position: FilePosition,
        total_stages: usize,
        cancel: &CancellationFlag,
        progress: &ProgressSink,
    ) -> Vec<StageResult> {
        let update = |completed: usize| ProgressUpdate {
            event: ProgressEvent::ChunkCompleted,
            file_index: position.index,
            total_files: position.total,
            stage_index: step,
            total_stages,
            chunk_index: completed,
            total_chunks: chunks.len(),
        };

        if operation.kind.is_continuity_sensitive() || self.max_concurrent == 1 {
            let mut results: Vec<StageResult> = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let previous_output = results
                    .last()
                    .filter(|r| r.is_ok())
                    .map(|r| r.output_text.as_str());
                let result = self.runner.run(step, chunk, operation, previous_output, cancel).await;
                results.push(result);
                progress.report(update(results.len()));
            }
            return results;
        }

        let mut completed = 0;
        let mut results: Vec<StageResult> = stream::iter(chunks)
            .map(|chunk| self.runner.run(step, chunk, operation, None, cancel))
            .buffer_unordered(self.max_concurrent)
            .inspect(|_| {
                completed += 1;
                progress.report(update(completed));
            })
            .collect()
            .await;

        results.sort_by_key(|r| r.chunk_index);
        results
    }
}
