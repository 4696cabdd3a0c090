use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::file_utils::FileManager;

/// A source text and the path it came from; immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: PathBuf,
    text: String,
}

impl Document {
    pub fn new(id: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Read a UTF-8 text file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = FileManager::read_to_string(&path)?;
        Ok(Self::new(path.as_ref(), text))
    }

    pub fn id(&self) -> &Path {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// File name for log messages
    pub fn display_name(&self) -> String {
        self.id
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.id.display().to_string())
    }
}
