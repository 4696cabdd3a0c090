/*!
 * Operation and pipeline specifications.
 *
 * An operation is one text transformation performed by a model. A
 * pipeline is an ordered list of operations; each one consumes the
 * merged output of the one before it.
 */

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::language_utils::resolve_language;
use crate::processing::formatting::OutputCleaner;
use crate::processing::prompts::{self, PromptOverrides, ResolvedSubOperation};
use crate::providers::Prompt;

/// Option key holding the source language of a translation
pub const SOURCE_LANGUAGE: &str = "source_language";
/// Option key holding the target language of a translation
pub const TARGET_LANGUAGE: &str = "target_language";
/// Paraphrase option selecting one of the `adjust_tone_*` sub-operations
pub const TARGET_TONE: &str = "target_tone";

/// The closed set of operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Translate,
    Audiobook,
    Paraphrase,
}

impl OperationKind {
    /// Whether each chunk needs the previous chunk's output as context,
    /// which forces sequential processing
    pub fn is_continuity_sensitive(self) -> bool {
        matches!(self, Self::Translate)
    }

    pub fn default_temperature(self) -> f32 {
        match self {
            Self::Translate => 0.3,
            Self::Audiobook | Self::Paraphrase => 0.5,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Translate => "Translation",
            Self::Audiobook => "Audiobook preparation",
            Self::Paraphrase => "Paraphrase",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Translate => "translate",
            Self::Audiobook => "audiobook",
            Self::Paraphrase => "paraphrase",
        };
        write!(f, "{}", name)
    }
}

/// Value of an operation option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Flag(bool),
    Text(String),
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One configured operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    pub kind: OperationKind,
    pub model: String,
    pub temperature: f32,
    pub options: BTreeMap<String, OptionValue>,
    pub prompts: PromptOverrides,
    /// Remove repeated overlap when merging this stage's outputs
    pub deduplicate: bool,
}

impl OperationSpec {
    pub fn new(kind: OperationKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            temperature: kind.default_temperature(),
            options: BTreeMap::new(),
            prompts: PromptOverrides::default(),
            deduplicate: true,
        }
    }

    /// A translation between two languages (codes or names)
    pub fn translate(model: impl Into<String>, source_language: &str, target_language: &str) -> Self {
        Self::new(OperationKind::Translate, model)
            .with_option(SOURCE_LANGUAGE, source_language)
            .with_option(TARGET_LANGUAGE, target_language)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_prompts(mut self, prompts: PromptOverrides) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    /// Whether a flag option is set
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.options.get(key), Some(OptionValue::Flag(true)))
    }

    /// A text option, if present and non-empty
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.options.get(key) {
            Some(OptionValue::Text(value)) if !value.trim().is_empty() => Some(value.trim()),
            _ => None,
        }
    }

    /// A language option as the name used in prompts
    pub fn language(&self, key: &str) -> Option<String> {
        self.text(key)
            .map(|value| resolve_language(value).unwrap_or_else(|_| value.to_string()))
    }

    /// Sub-operations enabled on an audiobook or paraphrase operation.
    ///
    /// Catalog entries come first in catalog order, followed by custom
    /// sub-operations from the prompt overrides in id order.
    pub fn sub_operations(&self) -> Vec<ResolvedSubOperation> {
        let tone_id = match (self.kind, self.text(TARGET_TONE)) {
            (OperationKind::Paraphrase, Some(tone)) if tone != "none" => {
                Some(format!("adjust_tone_{}", tone.to_lowercase()))
            }
            _ => None,
        };
        let enabled = |id: &str| self.flag(id) || tone_id.as_deref() == Some(id);

        let catalog = prompts::catalog(self.kind);
        let mut resolved: Vec<ResolvedSubOperation> = catalog
            .iter()
            .filter(|sub| enabled(sub.id))
            .map(|sub| ResolvedSubOperation {
                id: sub.id.to_string(),
                task: sub.task.to_string(),
                instruction: self.prompts.sub_operations
                    .get(sub.id)
                    .cloned()
                    .unwrap_or_else(|| sub.instruction.to_string()),
                step_name: sub.step_name.to_string(),
            })
            .collect();

        if self.kind != OperationKind::Translate {
            for (id, instruction) in &self.prompts.sub_operations {
                let known = catalog.iter().any(|sub| sub.id == id.as_str());
                if !known && enabled(id.as_str()) {
                    resolved.push(ResolvedSubOperation {
                        id: id.clone(),
                        task: id.replace('_', " "),
                        instruction: instruction.clone(),
                        step_name: id.clone(),
                    });
                }
            }
        }

        resolved
    }

    /// Whether running the operation would do anything
    pub fn is_runnable(&self) -> bool {
        match self.kind {
            OperationKind::Translate => true,
            _ => !self.sub_operations().is_empty(),
        }
    }

    /// Tag used in the step artifact name
    pub fn step_tag(&self) -> String {
        match self.kind {
            OperationKind::Translate => "translated".to_string(),
            _ => {
                let names: Vec<String> = self.sub_operations().into_iter().map(|s| s.step_name).collect();
                if names.is_empty() {
                    self.kind.to_string()
                } else {
                    names.join("_")
                }
            }
        }
    }

    /// Render the prompt for one chunk
    pub fn build_prompt(&self, chunk: &str, context: Option<&str>) -> Prompt {
        match self.kind {
            OperationKind::Translate => {
                let source = self.language(SOURCE_LANGUAGE).unwrap_or_else(|| "the source language".to_string());
                let target = self.language(TARGET_LANGUAGE).unwrap_or_else(|| "English".to_string());
                prompts::build_translation_prompt(&source, &target, &self.prompts, chunk, context)
            }
            _ => prompts::build_combined_prompt(self.kind, &self.sub_operations(), chunk),
        }
    }

    /// Strip wrapper artifacts from a raw model response
    pub fn clean_output(&self, raw: &str, source: &str) -> String {
        OutputCleaner::clean(self.kind, raw, source)
    }
}

/// Ordered sequence of operations; step numbers start at 1
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSpec {
    operations: Vec<OperationSpec>,
}

impl PipelineSpec {
    pub fn new(operations: Vec<OperationSpec>) -> Self {
        Self { operations }
    }

    /// A pipeline with no stages; running it copies the input
    pub fn empty() -> Self {
        Self::default()
    }

    /// Drop operations that have nothing to do, warning about each
    pub fn without_idle_operations(self) -> Self {
        let operations = self
            .operations
            .into_iter()
            .filter(|op| {
                let runnable = op.is_runnable();
                if !runnable {
                    warn!("Skipping {} operation: no sub-operations enabled", op.kind);
                }
                runnable
            })
            .collect();
        Self { operations }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    /// Operations paired with their step number
    pub fn steps(&self) -> impl Iterator<Item = (usize, &OperationSpec)> {
        self.operations.iter().enumerate().map(|(i, op)| (i + 1, op))
    }
}
