/*!
 * Progress reporting and cooperative cancellation.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// What a progress update reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A file is about to be processed; `stage_index` is 0
    FileStarted,
    /// A chunk of the current stage completed
    ChunkCompleted,
    /// A file left the pipeline, whatever its outcome
    FileFinished,
}

/// Position of a batch run.
///
/// All positions are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub event: ProgressEvent,
    pub file_index: usize,
    pub total_files: usize,
    pub stage_index: usize,
    pub total_stages: usize,
    /// Number of chunks of the current stage completed so far
    pub chunk_index: usize,
    pub total_chunks: usize,
}

impl ProgressUpdate {
    /// Number of files of the batch fully processed at this update
    pub fn files_done(&self) -> usize {
        match self.event {
            ProgressEvent::FileFinished => self.file_index,
            ProgressEvent::FileStarted | ProgressEvent::ChunkCompleted => self.file_index.saturating_sub(1),
        }
    }
}

/// Sending half of the progress stream; never blocks the pipeline
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    sender: Option<UnboundedSender<ProgressUpdate>>,
}

impl ProgressSink {
    /// A sink and the receiver that observes it
    pub fn channel() -> (Self, UnboundedReceiver<ProgressUpdate>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    /// A sink that drops every update
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn report(&self, update: ProgressUpdate) {
        if let Some(sender) = &self.sender {
            // A closed receiver only means nobody is watching
            let _ = sender.send(update);
        }
    }
}

/// Shared flag requesting a run to stop at the next safe point
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
