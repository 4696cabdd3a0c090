/*!
 * Prompt templates for the pipeline operations.
 *
 * Translation uses a first/continuation pair of templates so that every
 * chunk after the first sees the tail of the previous translation.
 * Audiobook and paraphrase operations fold all of their enabled
 * sub-operations into one combined prompt, so each chunk is sent once
 * per stage no matter how many sub-operations are enabled.
 */

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::processing::operation::OperationKind;
use crate::providers::Prompt;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// A template with `{name}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub const TRANSLATE_SYSTEM_FIRST: &'static str = "You are a professional translator. Translate the text from {src_lang} to {target_lang}. \
Preserve the meaning, tone, paragraph breaks and formatting of the original. \
Translate everything: do not summarize, omit or add content. \
Output ONLY the translated text without any explanations, notes or introductory remarks.";

    pub const TRANSLATE_USER_FIRST: &'static str = "Translate the following text from {src_lang} to {target_lang}:\n\n{chunk}";

    pub const TRANSLATE_SYSTEM_CONTINUATION: &'static str = "You are a professional translator continuing the translation of a longer document from {src_lang} to {target_lang}. \
Keep names, terminology and style consistent with the part already translated. \
Translate only the new text and never repeat the context you are given. \
Output ONLY the translated text without any explanations, notes or introductory remarks.";

    pub const TRANSLATE_USER_CONTINUATION: &'static str = "For context, the translation so far ends with:\n\"...{context_snippet}\"\n\n\
Continue by translating the following text from {src_lang} to {target_lang}:\n\n{chunk}";

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Substitute placeholders in a single pass.
    ///
    /// Values are inserted verbatim, so braces inside a chunk are never
    /// interpreted. Unknown placeholders are left as they are.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| {
                let name = &caps[1];
                vars.iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Per-operation replacements for the built-in wording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_first: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_first: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_continuation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_continuation: Option<String>,

    /// Sub-operation id to instruction. Ids missing from the built-in
    /// catalog define new sub-operations.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_operations: BTreeMap<String, String>,
}

/// A built-in sub-operation of the audiobook or paraphrase kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubOperation {
    /// Option key that enables it
    pub id: &'static str,
    /// Short task name used in the user prompt
    pub task: &'static str,
    /// Instruction placed in the numbered task list
    pub instruction: &'static str,
    /// Fragment of the step artifact name
    pub step_name: &'static str,
}

pub const PARAPHRASE_SUB_OPERATIONS: &[SubOperation] = &[
    SubOperation {
        id: "improve_flow",
        task: "improve flow and readability",
        instruction: "Improve the flow and readability of the text: smooth the transitions between sentences and vary sentence structure where it is monotonous.",
        step_name: "flow",
    },
    SubOperation {
        id: "simplify_language",
        task: "simplify complex language",
        instruction: "Simplify complex vocabulary and overly long sentences so the text is easy to understand, keeping every idea intact.",
        step_name: "simplified",
    },
    SubOperation {
        id: "remove_idioms",
        task: "replace idioms with literal language",
        instruction: "Replace idioms, figures of speech and colloquialisms with plain literal wording that carries the same meaning.",
        step_name: "literal",
    },
    SubOperation {
        id: "adjust_tone_formal",
        task: "adjust tone to be more formal",
        instruction: "Adjust the tone to be more formal: avoid contractions and slang and prefer precise, polished wording.",
        step_name: "formal",
    },
    SubOperation {
        id: "adjust_tone_casual",
        task: "adjust tone to be more casual",
        instruction: "Adjust the tone to be more casual and relaxed, as if written for a friend, without becoming sloppy.",
        step_name: "casual",
    },
    SubOperation {
        id: "adjust_tone_professional",
        task: "adjust tone to be more professional",
        instruction: "Adjust the tone to be more professional: clear, confident and businesslike.",
        step_name: "professional",
    },
    SubOperation {
        id: "adjust_tone_conversational",
        task: "adjust tone to be more conversational",
        instruction: "Adjust the tone to be more conversational, addressing the reader directly where it reads naturally.",
        step_name: "conversational",
    },
];

pub const AUDIOBOOK_SUB_OPERATIONS: &[SubOperation] = &[
    SubOperation {
        id: "spell_out_numbers",
        task: "spell out numbers",
        instruction: "Spell out numbers, dates, times, percentages and currency amounts as words the way a narrator would say them.",
        step_name: "numbers",
    },
    SubOperation {
        id: "expand_abbreviations",
        task: "expand abbreviations",
        instruction: "Expand abbreviations, acronyms and symbols into their spoken form unless they are normally read letter by letter.",
        step_name: "abbrev",
    },
    SubOperation {
        id: "remove_references",
        task: "remove non-spoken references",
        instruction: "Remove footnote markers, citation brackets, URLs and other references that cannot be read aloud.",
        step_name: "clean",
    },
    SubOperation {
        id: "normalize_punctuation",
        task: "normalize punctuation for narration",
        instruction: "Normalize punctuation for narration: replace decorative symbols, bullet characters and markup with plain sentences and natural pauses.",
        step_name: "punct",
    },
];

/// Built-in sub-operations of a kind
pub fn catalog(kind: OperationKind) -> &'static [SubOperation] {
    match kind {
        OperationKind::Translate => &[],
        OperationKind::Audiobook => AUDIOBOOK_SUB_OPERATIONS,
        OperationKind::Paraphrase => PARAPHRASE_SUB_OPERATIONS,
    }
}

/// A sub-operation enabled on a concrete operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubOperation {
    pub id: String,
    pub task: String,
    pub instruction: String,
    pub step_name: String,
}

/// Build the prompt for one translation chunk.
///
/// With `context` the continuation templates are used and the snippet is
/// embedded; otherwise the first-chunk templates.
pub fn build_translation_prompt(
    source_language: &str,
    target_language: &str,
    overrides: &PromptOverrides,
    chunk: &str,
    context: Option<&str>,
) -> Prompt {
    let (system, user) = match context {
        Some(snippet) => {
            let system = PromptTemplate::new(
                overrides.system_continuation.as_deref().unwrap_or(PromptTemplate::TRANSLATE_SYSTEM_CONTINUATION),
            );
            let user = PromptTemplate::new(
                overrides.user_continuation.as_deref().unwrap_or(PromptTemplate::TRANSLATE_USER_CONTINUATION),
            );
            let vars = [
                ("src_lang", source_language),
                ("target_lang", target_language),
                ("context_snippet", snippet),
                ("chunk", chunk),
            ];
            (system.render(&vars), user.render(&vars))
        }
        None => {
            let system = PromptTemplate::new(
                overrides.system_first.as_deref().unwrap_or(PromptTemplate::TRANSLATE_SYSTEM_FIRST),
            );
            let user = PromptTemplate::new(
                overrides.user_first.as_deref().unwrap_or(PromptTemplate::TRANSLATE_USER_FIRST),
            );
            let vars = [
                ("src_lang", source_language),
                ("target_lang", target_language),
                ("chunk", chunk),
            ];
            (system.render(&vars), user.render(&vars))
        }
    };

    Prompt::new(system, user, chunk)
}

/// Build one prompt that applies every enabled sub-operation in a single pass
pub fn build_combined_prompt(kind: OperationKind, sub_operations: &[ResolvedSubOperation], chunk: &str) -> Prompt {
    let mut system = String::from(match kind {
        OperationKind::Audiobook => "You are an audiobook script editor preparing text to be read aloud by a narrator. \
You will perform MULTIPLE tasks on the provided text in a SINGLE pass.",
        _ => "You are a professional content rewriter and editor. \
You will perform MULTIPLE tasks on the provided text in a SINGLE pass.",
    });

    system.push_str("\n\nYour tasks are:");
    for (number, sub_operation) in sub_operations.iter().enumerate() {
        system.push_str(&format!("\n{}. {}", number + 1, sub_operation.instruction));
    }

    system.push_str(concat!(
        "\n\nCRITICAL REQUIREMENTS:",
        "\n• Perform ALL tasks listed above in a single pass",
        "\n• DO NOT translate or change the language of the text",
        "\n• Do NOT omit any content, change the meaning, or alter factual information",
        "\n• Preserve all key points, arguments, and details",
        "\n• Keep the paragraph structure of the original",
        "\n\nOUTPUT FORMAT:",
        "\nOutput ONLY the fully processed text with all tasks applied. No explanations, no meta-comments, no introductory remarks. Start immediately with the processed content.",
    ));

    let tasks: Vec<&str> = sub_operations.iter().map(|s| s.task.as_str()).collect();
    let user = PromptTemplate::new("Process this text by applying these tasks: {tasks}.\n\nText to process:\n\n{text}")
        .render(&[("tasks", &join_tasks(&tasks)), ("text", chunk)]);

    Prompt::new(system, user, chunk)
}

/// `a`, `a and b`, `a, b, and c`
pub fn join_tasks(tasks: &[&str]) -> String {
    match tasks {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}
