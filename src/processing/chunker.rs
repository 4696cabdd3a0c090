/*!
 * Boundary-aware splitting of long texts into overlapping chunks.
 *
 * Sizes are counted in characters; offsets are byte offsets into the
 * input and always fall on `char` boundaries, so `&text[start..end]`
 * is always valid.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::PipelineError;

/// A blank line, including any whitespace that follows it
pub(crate) static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n[ \t]*\r?\n\s*").unwrap()
});

/// Sentence-ending punctuation, optional closing quotes/brackets, then whitespace
pub(crate) static SENTENCE_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[.!?…]["'»”’)\]]*\s+"#).unwrap()
});

/// Any whitespace run
pub(crate) static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").unwrap()
});

/// Upper bound for the default boundary search radius
const MAX_DEFAULT_RADIUS: usize = 200;

/// Settings controlling how a text is split
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingOptions {
    /// Target chunk length in characters
    pub target_size: usize,

    /// Maximum characters shared by two adjacent chunks
    pub overlap_size: usize,

    /// Texts up to this many characters are processed as one chunk.
    /// Defaults to `target_size`.
    pub small_file_threshold: Option<usize>,

    /// How far (in characters) a boundary may move from the window end.
    /// Defaults to a quarter of the target size, capped at 200.
    pub search_radius: Option<usize>,

    /// Never split: the whole text is a single chunk
    pub process_entire_file: bool,
}

impl ChunkingOptions {
    /// Create options with the given target and overlap sizes
    pub fn new(target_size: usize, overlap_size: usize) -> Self {
        Self {
            target_size,
            overlap_size,
            small_file_threshold: None,
            search_radius: None,
            process_entire_file: false,
        }
    }

    /// Set the small-file threshold
    pub fn with_small_file_threshold(mut self, threshold: usize) -> Self {
        self.small_file_threshold = Some(threshold);
        self
    }

    /// Set the boundary search radius
    pub fn with_search_radius(mut self, radius: usize) -> Self {
        self.search_radius = Some(radius);
        self
    }

    /// Enable or disable whole-file mode
    pub fn entire_file(mut self, enabled: bool) -> Self {
        self.process_entire_file = enabled;
        self
    }

    /// Reject settings that cannot guarantee forward progress
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.process_entire_file {
            return Ok(());
        }
        if self.target_size == 0 {
            return Err(PipelineError::config("chunk size must be greater than zero"));
        }
        if self.overlap_size >= self.target_size {
            return Err(PipelineError::config(format!(
                "overlap ({}) must be smaller than chunk size ({})",
                self.overlap_size, self.target_size
            )));
        }
        Ok(())
    }

    /// Effective small-file threshold
    pub fn threshold(&self) -> usize {
        self.small_file_threshold.unwrap_or(self.target_size)
    }

    /// Effective boundary search radius
    pub fn radius(&self) -> usize {
        self.search_radius
            .unwrap_or_else(|| (self.target_size / 4).min(MAX_DEFAULT_RADIUS))
            .max(1)
    }
}

/// A positioned slice of a text produced for independent processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the split, starting at 0
    pub index: usize,

    /// Byte offset where the chunk starts
    pub start_offset: usize,

    /// Byte offset one past the end of the chunk
    pub end_offset: usize,

    /// The chunk text, `input[start_offset..end_offset]`
    pub text: String,

    /// Whether the head of this chunk repeats the tail of the previous one
    pub has_overlap_prefix: bool,

    /// Whether the tail of this chunk is repeated by the next one
    pub has_overlap_suffix: bool,

    /// Length in bytes of the shared head
    pub overlap_len: usize,
}

impl Chunk {
    /// A single chunk covering `text` entirely
    pub fn whole(text: &str) -> Self {
        Self {
            index: 0,
            start_offset: 0,
            end_offset: text.len(),
            text: text.to_string(),
            has_overlap_prefix: false,
            has_overlap_suffix: false,
            overlap_len: 0,
        }
    }

    /// The head shared with the previous chunk
    pub fn overlap_text(&self) -> &str {
        &self.text[..self.overlap_len]
    }

    /// The part of the chunk not contained in the previous chunk
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap_len..]
    }

    /// Number of characters in the chunk
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split `text` into ordered, overlapping chunks.
///
/// Empty input yields no chunks. Inputs no longer than the small-file
/// threshold, or any input in whole-file mode, yield a single chunk.
pub fn split(text: &str, options: &ChunkingOptions) -> Result<Vec<Chunk>, PipelineError> {
    options.validate()?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    if options.process_entire_file || text.chars().count() <= options.threshold() {
        return Ok(vec![Chunk::whole(text)]);
    }

    let radius = options.radius();
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut start = 0;
    let mut previous_end = 0;
    let mut overlap_len = 0;

    loop {
        let window_end = advance_chars(text, start, options.target_size);
        let end = if window_end >= text.len() {
            text.len()
        } else {
            // Never end at or before the previous end, or the next chunk would be swallowed
            let lower = retreat_chars(text, window_end, radius).max(advance_chars(text, previous_end, 1));
            let upper = advance_chars(text, window_end, radius);
            find_split_point(text, start, lower, window_end, upper)
        };

        chunks.push(Chunk {
            index: chunks.len(),
            start_offset: start,
            end_offset: end,
            text: text[start..end].to_string(),
            has_overlap_prefix: overlap_len > 0,
            has_overlap_suffix: false,
            overlap_len,
        });

        if end >= text.len() {
            break;
        }

        let candidate = retreat_chars(text, end, options.overlap_size);
        let mut next_start = find_start_point(text, candidate, end);
        if next_start <= start {
            next_start = end;
        }

        overlap_len = end - next_start;
        if overlap_len > 0 {
            if let Some(last) = chunks.last_mut() {
                last.has_overlap_suffix = true;
            }
        }

        previous_end = end;
        start = next_start;
    }

    Ok(chunks)
}

/// Concatenate chunk texts with overlap removed.
///
/// For any output of [`split`] this returns the original input.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        text.push_str(chunk.fresh_text());
    }
    text
}

/// Byte offset `n` characters after `from`, clamped to the text length
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Byte offset `n` characters before `from`, clamped to zero
fn retreat_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Pick the end of a chunk near `target` within `[lower, upper]`.
///
/// Paragraph breaks beat sentence ends, which beat plain whitespace; a
/// hard cut at `target` is the last resort. Within a class the candidate
/// closest to `target` wins.
fn find_split_point(text: &str, start: usize, lower: usize, target: usize, upper: usize) -> usize {
    let region = &text[start..upper];

    for pattern in [&*PARAGRAPH_BREAK, &*SENTENCE_END, &*WHITESPACE_RUN] {
        let best = pattern
            .find_iter(region)
            .map(|m| start + m.end())
            .filter(|&pos| pos >= lower && pos <= upper)
            .min_by_key(|&pos| (pos.abs_diff(target), pos));

        if let Some(pos) = best {
            return pos;
        }
    }

    target
}

/// Pick the start of the next chunk at or after `candidate` and no later than `limit`.
///
/// Prefers a paragraph start, then a sentence start, then a word start;
/// `limit` itself (the previous end) is always acceptable.
fn find_start_point(text: &str, candidate: usize, limit: usize) -> usize {
    if candidate >= limit {
        return limit;
    }

    // Look one character back so a boundary right before `candidate` is seen
    let from = retreat_chars(text, candidate, 1);
    let region = &text[from..limit];

    for pattern in [&*PARAGRAPH_BREAK, &*SENTENCE_END, &*WHITESPACE_RUN] {
        let first = pattern
            .find_iter(region)
            .map(|m| from + m.end())
            .find(|&pos| pos >= candidate && pos <= limit);

        if let Some(pos) = first {
            return pos;
        }
    }

    if candidate == 0 { 0 } else { limit }
}
