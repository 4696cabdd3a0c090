/*!
 * Reassembly of per-chunk stage outputs.
 *
 * Adjacent chunks share an overlap region, so after a stage the same
 * content can appear at the end of one output and the start of the next.
 * The reassembler merges outputs in chunk order, substitutes the original
 * text for chunks that failed and removes the duplicated overlap where it
 * can be identified with certainty. When a duplicate is only partial,
 * both copies are kept and a note is recorded.
 */

use serde::{Deserialize, Serialize};

use crate::processing::chunker::{Chunk, PARAGRAPH_BREAK, SENTENCE_END};
use crate::processing::stage_runner::{StageResult, StageStatus};

/// Most units compared at a junction
const MAX_JUNCTION_UNITS: usize = 8;

/// Shortest shared fragment reported as a partial duplicate
const MIN_PARTIAL_CHARS: usize = 12;

/// Longest fragment examined for a partial duplicate
const MAX_PARTIAL_CHARS: usize = 512;

/// Unit used to compare outputs across a junction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupGranularity {
    #[default]
    Paragraph,
    Sentence,
}

/// A junction where duplication could not be resolved safely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupNote {
    /// Index of the chunk on the right of the junction
    pub chunk_index: usize,
    pub message: String,
}

/// Result of merging one stage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergedStage {
    pub text: String,
    /// Chunks whose original text was used because processing failed
    pub degraded_chunks: Vec<usize>,
    /// Failure reason per degraded chunk, in the same order
    pub failures: Vec<(usize, String)>,
    pub notes: Vec<DedupNote>,
}

impl MergedStage {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_chunks.is_empty()
    }
}

/// The piece appended at a junction
struct Junction<'a> {
    text: &'a str,
    /// Whitespace to use instead of the one derived from the source
    separator: Option<&'a str>,
}

/// Merges stage results into one text
#[derive(Debug, Clone, Copy, Default)]
pub struct Reassembler {
    granularity: DedupGranularity,
}

impl Reassembler {
    pub fn new(granularity: DedupGranularity) -> Self {
        Self { granularity }
    }

    pub fn granularity(&self) -> DedupGranularity {
        self.granularity
    }

    /// Merge `results` for `chunks` in chunk order.
    ///
    /// The outcome depends only on the inputs, never on the order in
    /// which results were produced.
    pub fn merge(&self, chunks: &[Chunk], results: Vec<StageResult>) -> MergedStage {
        self.merge_with(chunks, results, true)
    }

    /// Merge `results` in chunk order keeping every output whole, repeated
    /// overlap included
    pub fn concatenate(&self, chunks: &[Chunk], results: Vec<StageResult>) -> MergedStage {
        self.merge_with(chunks, results, false)
    }

    fn merge_with(&self, chunks: &[Chunk], mut results: Vec<StageResult>, strip: bool) -> MergedStage {
        results.sort_by_key(|result| result.chunk_index);

        let mut merged = MergedStage::default();
        let mut previous: Option<(&Chunk, &str)> = None;

        for result in &results {
            let Some(chunk) = chunks.get(result.chunk_index) else {
                continue;
            };

            let piece: &str = match &result.status {
                StageStatus::Ok => &result.output_text,
                StageStatus::Failed { reason } => {
                    merged.degraded_chunks.push(chunk.index);
                    merged.failures.push((chunk.index, reason.clone()));
                    &chunk.text
                }
                StageStatus::Skipped => &chunk.text,
            };

            match previous {
                None => merged.text.push_str(piece),
                Some((left_chunk, left_piece)) => {
                    let junction = if strip && chunk.has_overlap_prefix {
                        self.strip_overlap(left_piece, piece, chunk, &mut merged.notes)
                    } else {
                        Junction { text: piece, separator: None }
                    };
                    let separator = junction
                        .separator
                        .unwrap_or_else(|| source_separator(&left_chunk.text));
                    join(&mut merged.text, junction.text, separator);
                }
            }

            previous = Some((chunk, piece));
        }

        merged
    }

    /// Remove the part of `right` that repeats the end of `left`
    fn strip_overlap<'a>(
        &self,
        left: &str,
        right: &'a str,
        chunk: &Chunk,
        notes: &mut Vec<DedupNote>,
    ) -> Junction<'a> {
        let overlap = chunk.overlap_text();
        if !overlap.is_empty() && left.ends_with(overlap) && right.starts_with(overlap) {
            return Junction { text: &right[overlap.len()..], separator: None };
        }

        let left_units = units(left, self.granularity);
        let right_units = units(right, self.granularity);
        let left_tail = &left_units[left_units.len().saturating_sub(MAX_JUNCTION_UNITS)..];
        // Never strip more units than the overlap covers; repeats beyond it are real content
        let overlap_units = units(overlap, self.granularity).len().max(1);
        let limit = left_tail.len().min(right_units.len()).min(overlap_units);

        for count in (1..=limit).rev() {
            let tail = &left_tail[left_tail.len() - count..];
            let head = &right_units[..count];
            let equal = tail
                .iter()
                .zip(head)
                .all(|(&(ls, le), &(rs, re))| normalize(&left[ls..le]) == normalize(&right[rs..re]));

            if equal {
                let cut = head[count - 1].1;
                let rest = &right[cut..];
                let trimmed = rest.trim_start();
                let gap = &rest[..rest.len() - trimmed.len()];
                return Junction {
                    text: trimmed,
                    separator: Some(if gap.is_empty() { self.default_separator() } else { gap }),
                };
            }
        }

        if let (Some(&(ls, le)), Some(&(rs, re))) = (left_units.last(), right_units.first()) {
            let (last, first) = (normalize(&left[ls..le]), normalize(&right[rs..re]));
            if let Some(shared) = shared_fragment(&last, &first) {
                notes.push(DedupNote {
                    chunk_index: chunk.index,
                    message: format!(
                        "outputs of chunks {} and {} share {} characters that could not be matched to whole units; both copies kept",
                        chunk.index, chunk.index + 1, shared
                    ),
                });
            }
        }

        Junction { text: right, separator: None }
    }

    fn default_separator(&self) -> &'static str {
        match self.granularity {
            DedupGranularity::Paragraph => "\n\n",
            DedupGranularity::Sentence => " ",
        }
    }
}

/// Append `piece`, inserting `separator` when neither side has whitespace
fn join(text: &mut String, piece: &str, separator: &str) {
    if piece.is_empty() {
        return;
    }
    let left_ws = text.chars().next_back().is_some_and(char::is_whitespace);
    let right_ws = piece.chars().next().is_some_and(char::is_whitespace);
    if !text.is_empty() && !left_ws && !right_ws {
        text.push_str(separator);
    }
    text.push_str(piece);
}

/// Whitespace that ended a chunk in the source, reduced to its kind
fn source_separator(chunk_text: &str) -> &'static str {
    let trailing = &chunk_text[chunk_text.trim_end().len()..];
    match trailing.matches('\n').count() {
        0 if trailing.is_empty() => "",
        0 => " ",
        1 => "\n",
        _ => "\n\n",
    }
}

/// Byte spans of the non-empty units of `text`, trimmed
fn units(text: &str, granularity: DedupGranularity) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;

    for paragraph_break in PARAGRAPH_BREAK.find_iter(text) {
        push_units(text, start, paragraph_break.start(), granularity, &mut spans);
        start = paragraph_break.end();
    }
    push_units(text, start, text.len(), granularity, &mut spans);

    spans
}

fn push_units(text: &str, start: usize, end: usize, granularity: DedupGranularity, spans: &mut Vec<(usize, usize)>) {
    match granularity {
        DedupGranularity::Paragraph => push_trimmed(text, start, end, spans),
        DedupGranularity::Sentence => {
            let mut sentence_start = start;
            for sentence_end in SENTENCE_END.find_iter(&text[start..end]) {
                push_trimmed(text, sentence_start, start + sentence_end.end(), spans);
                sentence_start = start + sentence_end.end();
            }
            push_trimmed(text, sentence_start, end, spans);
        }
    }
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if !trimmed.is_empty() {
        let from = start + leading;
        spans.push((from, from + trimmed.len()));
    }
}

/// Collapse whitespace and lowercase
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Length in chars of the longest suffix of `left` that starts `right`,
/// or of one unit contained at the edge of the other
fn shared_fragment(left: &str, right: &str) -> Option<usize> {
    if left == right {
        return None;
    }

    let shorter = left.chars().count().min(right.chars().count());
    if shorter >= MIN_PARTIAL_CHARS && (right.starts_with(left) || left.ends_with(right)) {
        return Some(shorter);
    }

    let max_len = shorter.min(MAX_PARTIAL_CHARS);
    let right_prefixes: Vec<usize> = right
        .char_indices()
        .map(|(i, _)| i)
        .skip(1)
        .chain(std::iter::once(right.len()))
        .take(max_len)
        .collect();

    for (len, &end) in right_prefixes.iter().enumerate().rev() {
        let chars = len + 1;
        if chars < MIN_PARTIAL_CHARS {
            break;
        }
        if left.ends_with(&right[..end]) {
            return Some(chars);
        }
    }

    None
}
