/*!
 * Cleanup of raw model responses.
 *
 * Models sometimes wrap their answer in a chatty preamble ("Here is the
 * translation:") or in a markdown code fence. Only these recognizable
 * wrappers are removed; anything else in the response is kept verbatim.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::processing::operation::OperationKind;

/// A fence that encloses the entire response
static ENCLOSING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```\s*\z").unwrap()
});

/// A known preamble; `own_line` ones are stripped only when nothing else
/// follows them on the first line
#[derive(Debug, Clone, Copy)]
struct Preamble {
    text: &'static str,
    own_line: bool,
}

const fn preamble(text: &'static str, own_line: bool) -> Preamble {
    Preamble { text, own_line }
}

const COMMON_PREAMBLES: &[Preamble] = &[
    preamble("here is the processed text:", false),
    preamble("here's the processed text:", false),
    preamble("here is the rewritten text:", false),
    preamble("processed text:", true),
    preamble("rewritten text:", true),
];

const TRANSLATE_PREAMBLES: &[Preamble] = &[
    preamble("here is the complete translation:", false),
    preamble("here is the translation:", false),
    preamble("here's the translation:", false),
    preamble("complete translation:", true),
    preamble("translated text:", true),
    preamble("translation:", true),
];

const AUDIOBOOK_PREAMBLES: &[Preamble] = &[
    preamble("here is the narration-ready text:", false),
    preamble("here is the audiobook version:", false),
    preamble("audiobook version:", true),
];

const PARAPHRASE_PREAMBLES: &[Preamble] = &[
    preamble("here is the paraphrased text:", false),
    preamble("here is the revised text:", false),
    preamble("paraphrased text:", true),
    preamble("revised text:", true),
];

/// Strips wrapper artifacts from model output
pub struct OutputCleaner;

impl OutputCleaner {
    /// Remove a leading preamble and an enclosing code fence, in either order.
    ///
    /// A wrapper that `source` itself carries is part of the content and is
    /// kept in the output.
    pub fn clean(kind: OperationKind, raw: &str, source: &str) -> String {
        let keep_fence = Self::strip_enclosing_fence(source).is_some();
        let keep_preamble = Self::strip_preamble(kind, source).is_some();

        let mut text = Self::unfence(raw, keep_fence);

        let preamble = if keep_preamble { None } else { Self::strip_preamble(kind, text) };
        if let Some(rest) = preamble {
            text = Self::unfence(rest, keep_fence);
        }

        text.to_string()
    }

    fn unfence(text: &str, keep_fence: bool) -> &str {
        if keep_fence {
            return text;
        }
        Self::strip_enclosing_fence(text).unwrap_or(text)
    }

    /// Content of a fence wrapping the whole text
    pub fn strip_enclosing_fence(text: &str) -> Option<&str> {
        ENCLOSING_FENCE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Text after a known preamble, with the following whitespace removed
    pub fn strip_preamble(kind: OperationKind, text: &str) -> Option<&str> {
        let kind_specific = match kind {
            OperationKind::Translate => TRANSLATE_PREAMBLES,
            OperationKind::Audiobook => AUDIOBOOK_PREAMBLES,
            OperationKind::Paraphrase => PARAPHRASE_PREAMBLES,
        };

        let trimmed = text.trim_start();
        for candidate in kind_specific.iter().chain(COMMON_PREAMBLES) {
            let Some(head) = trimmed.get(..candidate.text.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(candidate.text) {
                continue;
            }

            let rest = &trimmed[candidate.text.len()..];
            if candidate.own_line {
                let first_line_rest = rest.split('\n').next().unwrap_or("");
                if !first_line_rest.trim().is_empty() {
                    continue;
                }
            }

            return Some(rest.trim_start());
        }

        None
    }
}
