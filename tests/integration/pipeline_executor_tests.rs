/*!
 * Integration tests for running one document through a pipeline
 */

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use textwai::errors::PipelineError;
use textwai::file_utils::OutputLayout;
use textwai::processing::chunker::{self, ChunkingOptions};
use textwai::processing::document::Document;
use textwai::processing::executor::{FilePosition, PipelineExecutor, RunStatus};
use textwai::processing::operation::{OperationKind, OperationSpec, PipelineSpec};
use textwai::processing::progress::{CancellationFlag, ProgressSink, ProgressUpdate};
use textwai::processing::stage_runner::RetryPolicy;
use textwai::providers::Prompt;
use textwai::providers::mock::MockClient;
use crate::common;

fn uppercase(prompt: &Prompt) -> String {
    prompt.source_text.to_uppercase()
}

fn executor(client: &MockClient, chunking: ChunkingOptions, out_dir: &Path) -> PipelineExecutor {
    common::init_test_logging();
    PipelineExecutor::new(Arc::new(client.clone()), RetryPolicy::immediate(1), chunking)
        .with_layout(OutputLayout::new(Some(out_dir.to_path_buf()), "_processed"))
}

fn translate() -> OperationSpec {
    OperationSpec::translate("mistral:latest", "en", "cs")
}

fn paraphrase() -> OperationSpec {
    OperationSpec::new(OperationKind::Paraphrase, "mistral:latest").with_option("improve_flow", true)
}

fn drain(receiver: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressUpdate>) -> Vec<ProgressUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = receiver.try_recv() {
        updates.push(update);
    }
    updates
}

#[tokio::test]
async fn test_run_withEchoClient_shouldReproduceInput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let out_dir = temp_dir.path().join("out");
    let text = common::generated_text(7, 12);
    let document = Document::new(temp_dir.path().join("story.txt"), text.clone());
    let client = MockClient::echo();

    let outcome = executor(&client, ChunkingOptions::new(200, 30), &out_dir)
        .run(&document, &PipelineSpec::new(vec![translate()]), FilePosition::default(), &CancellationFlag::new(), &ProgressSink::disabled())
        .await?;

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.artifacts.len(), 2);
    let final_path = outcome.final_output.clone().unwrap();
    assert_eq!(final_path, out_dir.join("story_processed.txt"));
    assert_eq!(fs::read_to_string(&final_path)?, text);
    assert_eq!(fs::read_to_string(out_dir.join("story_processed_step_01_translated.txt"))?, text);
    assert!(client.request_count() > 1);
    Ok(())
}

#[tokio::test]
async fn test_run_withTwoStages_shouldFeedEachStageIntoTheNext() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let document = Document::new(temp_dir.path().join("three.txt"), common::THREE_PARAGRAPHS);
    let client = MockClient::echo().with_custom_response(uppercase);
    let pipeline = PipelineSpec::new(vec![translate(), paraphrase()]);

    let outcome = executor(&client, ChunkingOptions::new(20, 5), temp_dir.path())
        .run(&document, &pipeline, FilePosition::default(), &CancellationFlag::new(), &ProgressSink::disabled())
        .await?;

    let names: Vec<String> = outcome
        .artifacts
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "three_processed_step_01_translated.txt",
            "three_processed_step_02_flow.txt",
            "three_processed.txt"
        ]
    );

    let expected = "PARAGRAPH ONE.\n\nPARAGRAPH TWO.\n\nPARAGRAPH THREE.";
    assert_eq!(fs::read_to_string(&outcome.artifacts[0])?, expected);
    assert_eq!(fs::read_to_string(&outcome.artifacts[2])?, expected);
    assert_eq!(outcome.stage_reports.len(), 2);
    assert_eq!(outcome.stage_reports[1].tag, "flow");
    assert_eq!(client.request_count(), 6);

    // The second stage saw the output of the first
    assert!(client.prompts()[3..].iter().all(|p| p.source_text == p.source_text.to_uppercase()));
    Ok(())
}

#[tokio::test]
async fn test_run_withFailingChunk_shouldKeepOriginalTextForIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let document = Document::new(temp_dir.path().join("three.txt"), common::THREE_PARAGRAPHS);
    let client = MockClient::fail_on_input("two").with_custom_response(uppercase);

    let outcome = executor(&client, ChunkingOptions::new(20, 5), temp_dir.path())
        .run(&document, &PipelineSpec::new(vec![translate()]), FilePosition::default(), &CancellationFlag::new(), &ProgressSink::disabled())
        .await?;

    assert_eq!(outcome.status, RunStatus::PartiallySucceeded { degraded_chunks: 1 });
    assert_eq!(outcome.stage_reports[0].degraded_chunks, vec![1]);
    assert!(outcome.stage_reports[0].failures[0].1.contains("timed out"));
    assert_eq!(
        fs::read_to_string(outcome.final_output.unwrap())?,
        "PARAGRAPH ONE.\n\nParagraph two.\n\nPARAGRAPH THREE."
    );
    // One retry for the failing chunk
    assert_eq!(client.request_count(), 4);
    Ok(())
}

#[tokio::test]
async fn test_run_afterCancellation_shouldWriteNothing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let out_dir = temp_dir.path().join("out");
    let document = Document::new(temp_dir.path().join("story.txt"), common::sample_story());
    let client = MockClient::echo();
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let outcome = executor(&client, ChunkingOptions::new(100, 10), &out_dir)
        .run(&document, &PipelineSpec::new(vec![translate()]), FilePosition::default(), &cancel, &ProgressSink::disabled())
        .await?;

    assert_eq!(outcome.status, RunStatus::Cancelled { completed_stages: 0 });
    assert!(outcome.final_output.is_none());
    assert!(outcome.artifacts.is_empty());
    assert!(!out_dir.exists());
    assert_eq!(client.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_cancelledMidStage_shouldNotPersistThatStage() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let out_dir = temp_dir.path().join("out");
    let document = Document::new(temp_dir.path().join("long.txt"), common::generated_text(3, 10));
    let client = MockClient::slow(50);
    let cancel = CancellationFlag::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(75)).await;
        trigger.cancel();
    });

    let outcome = executor(&client, ChunkingOptions::new(80, 10), &out_dir)
        .run(&document, &PipelineSpec::new(vec![translate(), paraphrase()]), FilePosition::default(), &cancel, &ProgressSink::disabled())
        .await?;

    assert_eq!(outcome.status, RunStatus::Cancelled { completed_stages: 0 });
    assert!(outcome.stage_reports.is_empty());
    assert!(!out_dir.exists());

    let chunk_count = chunker::split(document.text(), &ChunkingOptions::new(80, 10))?.len();
    assert!(client.request_count() < chunk_count);
    Ok(())
}

#[tokio::test]
async fn test_run_cancelledBetweenStages_shouldKeepOnlyCompletedStage() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let out_dir = temp_dir.path().join("out");
    let document = Document::new(temp_dir.path().join("three.txt"), common::THREE_PARAGRAPHS);
    let client = MockClient::slow(30);
    let cancel = CancellationFlag::new();
    let (sink, mut receiver) = ProgressSink::channel();

    // Cancel once the first stage has reported its only chunk
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        while let Some(update) = receiver.recv().await {
            if update.stage_index == 1 && update.chunk_index == update.total_chunks {
                trigger.cancel();
                break;
            }
        }
    });

    let outcome = executor(&client, ChunkingOptions::new(1000, 50), &out_dir)
        .run(&document, &PipelineSpec::new(vec![translate(), paraphrase()]), FilePosition::default(), &cancel, &sink)
        .await?;
    drop(sink);
    watcher.await?;

    assert_eq!(outcome.status, RunStatus::Cancelled { completed_stages: 1 });
    assert!(outcome.final_output.is_none());
    assert_eq!(outcome.stage_reports.len(), 1);
    assert_eq!(
        fs::read_to_string(out_dir.join("three_processed_step_01_translated.txt"))?,
        common::THREE_PARAGRAPHS
    );
    assert!(!out_dir.join("three_processed_step_02_flow.txt").exists());
    assert!(!out_dir.join("three_processed.txt").exists());
    assert_eq!(client.request_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_run_withDeduplicateDisabled_shouldKeepEveryChunkWhole() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let text = common::generated_text(7, 12);
    let chunking = ChunkingOptions::new(120, 20);
    let chunks = chunker::split(&text, &chunking)?;
    assert!(chunks.iter().any(|c| c.has_overlap_prefix));
    let document = Document::new(temp_dir.path().join("story.txt"), text.clone());
    let client = MockClient::echo();

    let outcome = executor(&client, chunking, temp_dir.path())
        .run(&document, &PipelineSpec::new(vec![translate().with_deduplicate(false)]), FilePosition::default(), &CancellationFlag::new(), &ProgressSink::disabled())
        .await?;

    let written = fs::read_to_string(outcome.final_output.unwrap())?;
    let whole: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(written, whole);
    assert_ne!(written, text);
    Ok(())
}

#[tokio::test]
async fn test_run_withEmptyPipeline_shouldCopyInput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let document = Document::new(temp_dir.path().join("story.md"), common::sample_story());
    let client = MockClient::echo();

    let outcome = executor(&client, ChunkingOptions::new(100, 10), temp_dir.path())
        .run(&document, &PipelineSpec::empty(), FilePosition::default(), &CancellationFlag::new(), &ProgressSink::disabled())
        .await?;

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.artifacts, vec![temp_dir.path().join("story_processed.md")]);
    assert_eq!(fs::read_to_string(&outcome.artifacts[0])?, common::sample_story());
    assert_eq!(client.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_preflight_withUnavailableModel_shouldFailBeforeAnyRequest() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let client = MockClient::echo().with_models(["llama3:latest"]);
    let executor = executor(&client, ChunkingOptions::new(100, 10), temp_dir.path());
    let document = Document::new(temp_dir.path().join("story.txt"), common::sample_story());

    let result = executor
        .run(&document, &PipelineSpec::new(vec![translate()]), FilePosition::default(), &CancellationFlag::new(), &ProgressSink::disabled())
        .await;

    assert!(matches!(result, Err(PipelineError::Configuration(_))));
    assert_eq!(client.request_count(), 0);

    let untagged = PipelineSpec::new(vec![OperationSpec::translate("llama3", "en", "de")]);
    assert!(executor.preflight(&untagged).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_run_withInvalidChunking_shouldFailWithConfigurationError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let client = MockClient::echo();
    let document = Document::new(temp_dir.path().join("story.txt"), common::sample_story());

    let result = executor(&client, ChunkingOptions::new(50, 60), temp_dir.path())
        .run(&document, &PipelineSpec::new(vec![translate()]), FilePosition::default(), &CancellationFlag::new(), &ProgressSink::disabled())
        .await;

    assert!(matches!(result, Err(PipelineError::Configuration(_))));
    assert_eq!(client.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_withConcurrentStage_shouldMergeInChunkOrder() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let text = common::generated_text(11, 15);
    let chunking = ChunkingOptions::new(150, 20);
    let chunk_count = chunker::split(&text, &chunking)?.len();
    let client = MockClient::staggered(5, chunk_count);
    let document = Document::new(temp_dir.path().join("story.txt"), text.clone());
    let (sink, mut receiver) = ProgressSink::channel();

    let outcome = executor(&client, chunking, temp_dir.path())
        .with_concurrency(4)
        .run(&document, &PipelineSpec::new(vec![paraphrase()]), FilePosition { index: 2, total: 3 }, &CancellationFlag::new(), &sink)
        .await?;

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(fs::read_to_string(outcome.final_output.unwrap())?, text);

    let updates = drain(&mut receiver);
    assert_eq!(updates.len(), chunk_count);
    assert!(updates.iter().all(|u| u.file_index == 2 && u.total_files == 3 && u.stage_index == 1));
    assert_eq!(updates.last().map(|u| u.chunk_index), Some(chunk_count));
    Ok(())
}

#[tokio::test]
async fn test_run_withTranslation_shouldProcessChunksInOrder() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let text = common::generated_text(5, 8);
    let chunking = ChunkingOptions::new(120, 15);
    let chunks = chunker::split(&text, &chunking)?;
    let client = MockClient::echo();
    let document = Document::new(temp_dir.path().join("story.txt"), text);

    executor(&client, chunking, temp_dir.path())
        .with_concurrency(4)
        .run(&document, &PipelineSpec::new(vec![translate()]), FilePosition::default(), &CancellationFlag::new(), &ProgressSink::disabled())
        .await?;

    let sources: Vec<String> = client.prompts().into_iter().map(|p| p.source_text).collect();
    let expected: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
    assert_eq!(sources, expected);
    Ok(())
}
