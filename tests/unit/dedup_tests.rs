/*!
 * Tests for merging chunk outputs
 */

use textwai::processing::chunker::{self, Chunk, ChunkingOptions};
use textwai::processing::dedup::{DedupGranularity, Reassembler, normalize};
use textwai::processing::stage_runner::StageResult;
use crate::common;

/// A chunk whose first `overlap` bytes repeat the previous chunk
fn chunk(index: usize, text: &str, overlap: &str) -> Chunk {
    assert!(text.starts_with(overlap));
    Chunk {
        index,
        start_offset: 0,
        end_offset: text.len(),
        text: text.to_string(),
        has_overlap_prefix: !overlap.is_empty(),
        has_overlap_suffix: false,
        overlap_len: overlap.len(),
    }
}

fn echo_results(chunks: &[Chunk]) -> Vec<StageResult> {
    chunks
        .iter()
        .map(|c| StageResult::ok(1, c.index, c.text.clone(), 1))
        .collect()
}

#[test]
fn test_merge_withEchoedChunks_shouldReconstructInput() {
    let chunks = chunker::split(common::THREE_PARAGRAPHS, &ChunkingOptions::new(20, 5)).unwrap();
    let merged = Reassembler::default().merge(&chunks, echo_results(&chunks));

    assert_eq!(merged.text, common::THREE_PARAGRAPHS);
    assert!(!merged.is_degraded());
    assert!(merged.notes.is_empty());
}

#[test]
fn test_merge_withGeneratedTexts_shouldReconstructInput() {
    for seed in 100..130u64 {
        let text = common::generated_text(seed, 2 + (seed as usize % 7));
        let target = 60 + (seed as usize * 53) % 300;
        let chunks = chunker::split(&text, &ChunkingOptions::new(target, target / 5)).unwrap();

        for granularity in [DedupGranularity::Paragraph, DedupGranularity::Sentence] {
            let merged = Reassembler::new(granularity).merge(&chunks, echo_results(&chunks));
            assert_eq!(merged.text, text, "seed {} {:?}", seed, granularity);
        }
    }
}

#[test]
fn test_merge_withResultsOutOfOrder_shouldMergeInChunkOrder() {
    let text = common::sample_story();
    let chunks = chunker::split(&text, &ChunkingOptions::new(120, 20)).unwrap();
    assert!(chunks.len() > 2);

    let mut results = echo_results(&chunks);
    results.reverse();
    let merged = Reassembler::default().merge(&chunks, results);

    assert_eq!(merged.text, text);
}

#[test]
fn test_merge_withFailedChunk_shouldUseOriginalText() {
    let chunks = chunker::split(common::THREE_PARAGRAPHS, &ChunkingOptions::new(20, 5)).unwrap();
    let results = vec![
        StageResult::ok(1, 0, "Odstavec jedna.\n\n".to_string(), 1),
        StageResult::failed(1, 1, "Request timed out: slow".to_string(), 4),
        StageResult::ok(1, 2, "Odstavec tři.".to_string(), 1),
    ];

    let merged = Reassembler::default().merge(&chunks, results);

    assert_eq!(merged.text, "Odstavec jedna.\n\nParagraph two.\n\nOdstavec tři.");
    assert_eq!(merged.degraded_chunks, vec![1]);
    assert_eq!(merged.failures[0].0, 1);
    assert!(merged.failures[0].1.contains("timed out"));
}

#[test]
fn test_merge_withSkippedChunk_shouldKeepItsText() {
    let chunks = vec![chunk(0, "First.\n\n", ""), chunk(1, "   \n\n", ""), chunk(2, "Last.", "")];
    let results = vec![
        StageResult::ok(1, 0, "Prvni.\n\n".to_string(), 1),
        StageResult::skipped(1, 1, 0),
        StageResult::ok(1, 2, "Posledni.".to_string(), 1),
    ];

    let merged = Reassembler::default().merge(&chunks, results);

    assert_eq!(merged.text, "Prvni.\n\n   \n\nPosledni.");
    assert!(!merged.is_degraded());
}

#[test]
fn test_merge_withTranslatedOverlap_shouldDropRepeatedParagraph() {
    let chunks = vec![
        chunk(0, "Hello world.\n\nSecond paragraph.\n\n", ""),
        chunk(1, "Second paragraph.\n\nThird paragraph.", "Second paragraph.\n\n"),
    ];
    let results = vec![
        StageResult::ok(1, 0, "Ahoj světe.\n\nDruhý odstavec.".to_string(), 1),
        StageResult::ok(1, 1, "druhý   odstavec.\n\nTřetí odstavec.".to_string(), 1),
    ];

    let merged = Reassembler::default().merge(&chunks, results);

    assert_eq!(merged.text, "Ahoj světe.\n\nDruhý odstavec.\n\nTřetí odstavec.");
    assert!(merged.notes.is_empty());
}

#[test]
fn test_merge_bySentence_shouldDropRepeatedSentence() {
    let chunks = vec![
        chunk(0, "One. Two. Three. ", ""),
        chunk(1, "Three. Four.", "Three. "),
    ];
    let results = vec![
        StageResult::ok(1, 0, "Jedna. Dva. Tři.".to_string(), 1),
        StageResult::ok(1, 1, "Tři. Čtyři.".to_string(), 1),
    ];

    let merged = Reassembler::new(DedupGranularity::Sentence).merge(&chunks, results);

    assert_eq!(merged.text, "Jedna. Dva. Tři. Čtyři.");
}

#[test]
fn test_merge_withPartialDuplicate_shouldKeepBothCopiesAndNote() {
    let chunks = vec![
        chunk(0, "She walked slowly towards the old mill. ", ""),
        chunk(1, "towards the old mill. Then she waited.", "towards the old mill. "),
    ];
    let results = vec![
        StageResult::ok(1, 0, "She walked slowly towards the old mill.".to_string(), 1),
        StageResult::ok(1, 1, "Towards the old mill. Then she waited.".to_string(), 1),
    ];

    let merged = Reassembler::default().merge(&chunks, results);

    assert_eq!(merged.text.matches("old mill").count(), 2);
    assert_eq!(merged.notes.len(), 1);
    assert_eq!(merged.notes[0].chunk_index, 1);
}

#[test]
fn test_normalize_shouldCollapseWhitespaceAndCase() {
    assert_eq!(normalize("  Hello\n\tWORLD  "), "hello world");
}

#[test]
fn test_merge_withRepeatedParagraphs_shouldOnlyDropTheOverlap() {
    let source = "Intro.\n\nLa.\n\nLa.\n\nLa.\n\nOutro.";
    let chunks = vec![
        chunk(0, "Intro.\n\nLa.\n\nLa.\n\n", ""),
        chunk(1, "La.\n\nLa.\n\nOutro.", "La.\n\n"),
    ];
    assert_eq!(chunker::reassemble(&chunks), source);
    let results = chunks
        .iter()
        .map(|c| StageResult::ok(1, c.index, c.text.to_uppercase(), 1))
        .collect();

    let merged = Reassembler::default().merge(&chunks, results);

    assert_eq!(merged.text, "INTRO.\n\nLA.\n\nLA.\n\nLA.\n\nOUTRO.");
}

#[test]
fn test_merge_withRepeatedSentences_shouldOnlyDropTheOverlap() {
    let chunks = vec![
        chunk(0, "Go. No. No. ", ""),
        chunk(1, "No. No. Stop.", "No. "),
    ];
    let results = vec![
        StageResult::ok(1, 0, "Jdi. Ne. Ne.".to_string(), 1),
        StageResult::ok(1, 1, "Ne. Ne. Stůj.".to_string(), 1),
    ];

    let merged = Reassembler::new(DedupGranularity::Sentence).merge(&chunks, results);

    assert_eq!(merged.text, "Jdi. Ne. Ne. Ne. Stůj.");
}

#[test]
fn test_concatenate_shouldKeepRepeatedOverlap() {
    let chunks = vec![
        chunk(0, "Intro.\n\nLa.\n\n", ""),
        chunk(1, "La.\n\nOutro.", "La.\n\n"),
    ];

    let merged = Reassembler::default().concatenate(&chunks, echo_results(&chunks));

    assert_eq!(merged.text, "Intro.\n\nLa.\n\nLa.\n\nOutro.");
    assert!(merged.notes.is_empty());
}
