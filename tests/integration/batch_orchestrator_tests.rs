/*!
 * Integration tests for processing several documents in one batch
 */

use anyhow::Result;
use std::fs;
use std::sync::Arc;
use textwai::file_utils::OutputLayout;
use textwai::processing::batch::{BatchJob, BatchOrchestrator, FileStatus};
use textwai::processing::chunker::ChunkingOptions;
use textwai::processing::document::Document;
use textwai::processing::executor::{PipelineExecutor, RunStatus};
use textwai::processing::operation::{OperationSpec, PipelineSpec};
use textwai::processing::progress::{CancellationFlag, ProgressEvent, ProgressSink};
use textwai::processing::stage_runner::RetryPolicy;
use textwai::providers::mock::MockClient;
use crate::common;

fn orchestrator(client: &MockClient) -> BatchOrchestrator {
    let executor = PipelineExecutor::new(Arc::new(client.clone()), RetryPolicy::immediate(0), ChunkingOptions::new(120, 15))
        .with_layout(OutputLayout::new(None, "_cs"));
    BatchOrchestrator::new(executor)
}

fn pipeline() -> PipelineSpec {
    PipelineSpec::new(vec![OperationSpec::translate("mistral:latest", "en", "cs")])
}

#[tokio::test]
async fn test_run_withTwoDocuments_shouldProcessBothInOrder() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let documents = vec![
        Document::new(temp_dir.path().join("a.txt"), common::sample_story()),
        Document::new(temp_dir.path().join("b.txt"), common::generated_text(1, 4)),
    ];
    let mut job = BatchJob::new(documents, pipeline());

    let outcomes = orchestrator(&MockClient::echo())
        .run(&mut job, &CancellationFlag::new(), &ProgressSink::disabled())
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].source, temp_dir.path().join("a.txt"));
    assert!(matches!(&outcomes[1].status, FileStatus::Completed(run) if run.status == RunStatus::Succeeded));
    assert_eq!(fs::read_to_string(temp_dir.path().join("a_cs.txt"))?, common::sample_story());

    let summary = job.summary();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.total(), 2);
    Ok(())
}

#[tokio::test]
async fn test_run_withUnwritableOutput_shouldContinueWithNextDocument() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let blocker = common::create_test_file(temp_dir.path(), "blocker", "not a directory")?;
    let documents = vec![
        Document::new(blocker.join("lost.txt"), "Some text that cannot be saved."),
        Document::new(temp_dir.path().join("kept.txt"), common::THREE_PARAGRAPHS),
    ];
    let mut job = BatchJob::new(documents, pipeline());

    orchestrator(&MockClient::echo())
        .run(&mut job, &CancellationFlag::new(), &ProgressSink::disabled())
        .await;

    let outcomes = job.outcomes();
    match &outcomes[0].status {
        FileStatus::Failed(reason) => assert!(reason.contains("persist")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(matches!(outcomes[1].status, FileStatus::Completed(_)));
    assert!(temp_dir.path().join("kept_cs.txt").exists());

    let summary = job.summary();
    assert_eq!((summary.succeeded, summary.failed), (1, 1));
    Ok(())
}

#[tokio::test]
async fn test_run_withPartialFailure_shouldCountDegradedChunks() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let documents = vec![Document::new(temp_dir.path().join("three.txt"), common::THREE_PARAGRAPHS)];
    let executor = PipelineExecutor::new(
        Arc::new(MockClient::fail_on_input("two")),
        RetryPolicy::immediate(0),
        ChunkingOptions::new(20, 5),
    )
    .with_layout(OutputLayout::new(None, "_cs"));
    let mut job = BatchJob::new(documents, pipeline());

    BatchOrchestrator::new(executor)
        .run(&mut job, &CancellationFlag::new(), &ProgressSink::disabled())
        .await;

    let summary = job.summary();
    assert_eq!(summary.partially_succeeded, 1);
    assert_eq!(summary.degraded_chunks, 1);
    assert_eq!(summary.succeeded, 0);
    Ok(())
}

#[tokio::test]
async fn test_run_afterCancellation_shouldSkipEveryDocument() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let documents = vec![
        Document::new(temp_dir.path().join("a.txt"), "One."),
        Document::new(temp_dir.path().join("b.txt"), "Two."),
    ];
    let mut job = BatchJob::new(documents, pipeline());
    let client = MockClient::echo();
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let outcomes = orchestrator(&client).run(&mut job, &cancel, &ProgressSink::disabled()).await;

    assert!(outcomes.iter().all(|o| o.status == FileStatus::Skipped));
    assert_eq!(client.request_count(), 0);
    assert_eq!(job.summary().skipped, 2);
    Ok(())
}

#[tokio::test]
async fn test_run_shouldReportStartOfEachFile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let documents = vec![
        Document::new(temp_dir.path().join("a.txt"), common::sample_story()),
        Document::new(temp_dir.path().join("b.txt"), common::sample_story()),
    ];
    let mut job = BatchJob::new(documents, pipeline());
    let (sink, mut receiver) = ProgressSink::channel();

    orchestrator(&MockClient::echo())
        .run(&mut job, &CancellationFlag::new(), &sink)
        .await;
    drop(sink);

    let mut starts = Vec::new();
    while let Some(update) = receiver.recv().await {
        if update.event == ProgressEvent::FileStarted {
            starts.push((update.file_index, update.total_files, update.total_stages));
        }
    }
    assert_eq!(starts, vec![(1, 2, 1), (2, 2, 1)]);
    Ok(())
}

#[tokio::test]
async fn test_run_withEmptyPipeline_shouldReportEachFileFinished() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let documents = vec![
        Document::new(temp_dir.path().join("a.txt"), common::sample_story()),
        Document::new(temp_dir.path().join("b.txt"), common::THREE_PARAGRAPHS),
    ];
    let mut job = BatchJob::new(documents, PipelineSpec::empty());
    let (sink, mut receiver) = ProgressSink::channel();

    orchestrator(&MockClient::echo())
        .run(&mut job, &CancellationFlag::new(), &sink)
        .await;
    drop(sink);

    let mut done = Vec::new();
    while let Some(update) = receiver.recv().await {
        assert_ne!(update.event, ProgressEvent::ChunkCompleted);
        done.push((update.event, update.files_done()));
    }
    assert_eq!(
        done,
        vec![
            (ProgressEvent::FileStarted, 0),
            (ProgressEvent::FileFinished, 1),
            (ProgressEvent::FileStarted, 1),
            (ProgressEvent::FileFinished, 2),
        ]
    );
    Ok(())
}

#[test]
fn test_record_failure_shouldAppearInSummary() {
    let mut job = BatchJob::new(Vec::new(), PipelineSpec::empty());
    job.record_failure(std::path::Path::new("broken.txt"), "invalid UTF-8");

    assert_eq!(job.outcomes()[0].status, FileStatus::Failed("invalid UTF-8".to_string()));
    assert_eq!(job.summary().failed, 1);
}
