/*!
 * Batch processing of several documents.
 *
 * Documents are processed strictly one after another with the same
 * pipeline. A fatal error in one document is recorded and the batch moves
 * on; a cancellation lets the active document reach a safe point and
 * marks the remaining documents as skipped.
 */

use log::{error, info, warn};
use std::path::{Path, PathBuf};

use crate::processing::document::Document;
use crate::processing::executor::{FilePosition, PipelineExecutor, RunOutcome, RunStatus};
use crate::processing::operation::PipelineSpec;
use crate::processing::progress::{CancellationFlag, ProgressEvent, ProgressSink, ProgressUpdate};

/// Result for one document of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Completed(RunOutcome),
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub status: FileStatus,
}

/// Documents to process, the pipeline to apply and the outcomes so far
#[derive(Debug, Clone)]
pub struct BatchJob {
    documents: Vec<Document>,
    pipeline: PipelineSpec,
    outcomes: Vec<FileOutcome>,
}

impl BatchJob {
    pub fn new(documents: Vec<Document>, pipeline: PipelineSpec) -> Self {
        Self {
            documents,
            pipeline,
            outcomes: Vec::new(),
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn pipeline(&self) -> &PipelineSpec {
        &self.pipeline
    }

    pub fn outcomes(&self) -> &[FileOutcome] {
        &self.outcomes
    }

    /// Record an outcome for a file that never became a document
    pub fn record_failure(&mut self, source: &Path, reason: impl Into<String>) {
        self.outcomes.push(FileOutcome {
            source: source.to_path_buf(),
            status: FileStatus::Failed(reason.into()),
        });
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_outcomes(&self.outcomes)
    }
}

/// Counts per outcome kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub partially_succeeded: usize,
    pub degraded_chunks: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[FileOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match &outcome.status {
                FileStatus::Completed(run) => match run.status {
                    RunStatus::Succeeded => summary.succeeded += 1,
                    RunStatus::PartiallySucceeded { degraded_chunks } => {
                        summary.partially_succeeded += 1;
                        summary.degraded_chunks += degraded_chunks;
                    }
                    RunStatus::Cancelled { .. } => summary.cancelled += 1,
                },
                FileStatus::Failed(_) => summary.failed += 1,
                FileStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.partially_succeeded + self.cancelled + self.failed + self.skipped
    }
}

/// Runs a batch job through an executor
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    executor: PipelineExecutor,
}

impl BatchOrchestrator {
    pub fn new(executor: PipelineExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    /// Process every document of `job` in order and return the outcomes
    pub async fn run<'a>(
        &self,
        job: &'a mut BatchJob,
        cancel: &CancellationFlag,
        progress: &ProgressSink,
    ) -> &'a [FileOutcome] {
        let total_files = job.documents.len();
        let total_stages = job.pipeline.len();

        for (i, document) in job.documents.iter().enumerate() {
            let source = document.id().to_path_buf();

            if cancel.is_cancelled() {
                info!("Skipping {} after cancellation", document.display_name());
                job.outcomes.push(FileOutcome { source, status: FileStatus::Skipped });
                continue;
            }

            let position = FilePosition { index: i + 1, total: total_files };
            progress.report(ProgressUpdate {
                event: ProgressEvent::FileStarted,
                file_index: position.index,
                total_files,
                stage_index: 0,
                total_stages,
                chunk_index: 0,
                total_chunks: 0,
            });
            info!("Processing file {}/{}: {}", position.index, total_files, document.display_name());

            let status = match self.executor.run(document, &job.pipeline, position, cancel, progress).await {
                Ok(outcome) => {
                    match &outcome.status {
                        RunStatus::Succeeded => info!("Success: {}", document.display_name()),
                        RunStatus::PartiallySucceeded { degraded_chunks } => warn!(
                            "Partial success: {} ({} chunk(s) degraded)",
                            document.display_name(),
                            degraded_chunks
                        ),
                        RunStatus::Cancelled { completed_stages } => warn!(
                            "Cancelled: {} after {} completed step(s)",
                            document.display_name(),
                            completed_stages
                        ),
                    }
                    FileStatus::Completed(outcome)
                }
                Err(e) => {
                    error!("Failed: {}: {}", document.display_name(), e);
                    FileStatus::Failed(e.to_string())
                }
            };

            progress.report(ProgressUpdate {
                event: ProgressEvent::FileFinished,
                file_index: position.index,
                total_files,
                stage_index: total_stages,
                total_stages,
                chunk_index: 0,
                total_chunks: 0,
            });
            job.outcomes.push(FileOutcome { source, status });
        }

        &job.outcomes
    }
}
