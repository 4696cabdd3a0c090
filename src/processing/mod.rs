/*!
 * Chunked text processing pipeline.
 *
 * A document is split into overlapping chunks, every configured operation
 * runs over the chunks through an inference client, and the outputs are
 * merged back into one text before the next operation sees it.
 *
 * - `chunker`: boundary-aware splitting
 * - `operation`: operation kinds, their options and the pipeline
 * - `prompts`: prompt wording and the sub-operation catalogs
 * - `formatting`: cleanup of model responses
 * - `stage_runner`: one operation on one chunk, with retries
 * - `dedup`: merging chunk outputs and removing duplicated overlap
 * - `executor`: one document through all stages
 * - `batch`: many documents, one after another
 * - `progress`: progress updates and cancellation
 */

pub mod batch;
pub mod chunker;
pub mod dedup;
pub mod document;
pub mod executor;
pub mod formatting;
pub mod operation;
pub mod progress;
pub mod prompts;
pub mod stage_runner;

pub use batch::{BatchJob, BatchOrchestrator, BatchSummary, FileOutcome, FileStatus};
pub use chunker::{Chunk, ChunkingOptions};
pub use dedup::{DedupGranularity, DedupNote, MergedStage, Reassembler};
pub use document::Document;
pub use executor::{FilePosition, PipelineExecutor, RunOutcome, RunState, RunStatus, StageReport};
pub use operation::{OperationKind, OperationSpec, OptionValue, PipelineSpec};
pub use progress::{CancellationFlag, ProgressSink, ProgressUpdate};
pub use stage_runner::{RetryPolicy, StageResult, StageRunner, StageStatus};
