use anyhow::{Result, Context};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use std::fs::OpenOptions;
use std::io::Write;
use chrono::Local;
use tempfile::NamedTempFile;

use crate::errors::PipelineError;

// @module: File and directory utilities

/// Extensions picked up when a directory is given as input
pub const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// Find text files in a directory, sorted by path
    pub fn find_text_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() && Self::is_text_file(path) {
                result.push(path.to_path_buf());
            }
        }

        result.sort();
        Ok(result)
    }

    /// Whether the path has one of the supported text extensions
    pub fn is_text_file<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                TEXT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a file so that readers see either the old content or the complete new one.
    ///
    /// Content goes to a temporary file in the destination directory which is
    /// then renamed over the target.
    pub fn write_atomic<P: AsRef<Path>>(path: P, content: &str) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let persistence = |source: std::io::Error| PipelineError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(persistence)?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(persistence)?;
        temp.write_all(content.as_bytes()).map_err(persistence)?;
        temp.as_file().sync_all().map_err(persistence)?;
        temp.persist(path).map_err(|e| persistence(e.error))?;

        Ok(())
    }

    /// Append content to a log file with timestamp
    pub fn append_to_log_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {:?}", path.as_ref()))?;

        writeln!(file, "[{}] {}", timestamp, content)
            .with_context(|| format!("Failed to write to log file: {:?}", path.as_ref()))?;

        Ok(())
    }
}

/// Naming scheme for the artifacts produced from one source file
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    /// Where artifacts go; `None` means next to the source file
    pub directory: Option<PathBuf>,

    /// Appended to the source stem, e.g. `_processed`
    pub suffix: String,
}

impl OutputLayout {
    pub fn new(directory: Option<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            directory,
            suffix: suffix.into(),
        }
    }

    /// Directory that receives the artifacts of `source`
    pub fn output_dir(&self, source: &Path) -> PathBuf {
        match &self.directory {
            Some(dir) => dir.clone(),
            None => source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// `<dir>/<stem><suffix><ext>`
    pub fn final_path(&self, source: &Path) -> PathBuf {
        let (stem, ext) = Self::split_name(source);
        self.output_dir(source)
            .join(format!("{}{}{}", stem, self.suffix, ext))
    }

    /// `<dir>/<stem><suffix>_step_<NN>_<tag><ext>`
    pub fn step_path(&self, source: &Path, step: usize, tag: &str) -> PathBuf {
        let (stem, ext) = Self::split_name(source);
        self.output_dir(source)
            .join(format!("{}{}_step_{:02}_{}{}", stem, self.suffix, step, tag, ext))
    }

    /// Issue log shared by all files written to the same directory
    pub fn issues_log_path(&self, source: &Path) -> PathBuf {
        self.output_dir(source).join("textwai.issues.log")
    }

    fn split_name(source: &Path) -> (String, String) {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (stem, ext)
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new(None, "_processed")
    }
}
