use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::app_dirs::AppDirs;
use crate::error::ConfigError;

pub const DEFAULT_EXAM_TEXT: &str = "The quick brown fox jumps over the lazy dog. Practice makes perfect when learning to type quickly and accurately.";
pub const DEFAULT_DURATION_SECS: u64 = 1200;

/// Legacy scoring switch kept in the exam file. Results are always scored
/// by words regardless of the value.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccuracyMode {
    #[default]
    Chars,
    Words,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExamConfig {
    pub text: String,
    pub duration_seconds: u64,
    pub allow_retake: bool,
    pub accuracy_mode: AccuracyMode,
    pub allow_backspace: bool,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            text: DEFAULT_EXAM_TEXT.to_string(),
            duration_seconds: DEFAULT_DURATION_SECS,
            allow_retake: true,
            accuracy_mode: AccuracyMode::Chars,
            allow_backspace: false,
        }
    }
}

impl ExamConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.text.trim().is_empty() {
            return Err(ConfigError::EmptyText);
        }
        if self.duration_seconds == 0 {
            return Err(ConfigError::InvalidDuration(self.duration_seconds));
        }
        Ok(())
    }

    /// Replace the passage with the contents of a plain text file.
    pub fn with_text_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        self.text = fs::read_to_string(path)?;
        Ok(self)
    }
}

pub trait ConfigStore {
    fn load(&self) -> ExamConfig;
    fn save(&self, cfg: &ExamConfig) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("typemark_exam.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> ExamConfig {
        let Ok(bytes) = fs::read(&self.path) else {
            return ExamConfig::default();
        };
        match serde_json::from_slice::<ExamConfig>(&bytes) {
            Ok(cfg) if cfg.validate().is_ok() => cfg,
            Ok(_) => {
                warn!(path = %self.path.display(), "exam configuration incomplete, using defaults");
                ExamConfig::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable exam configuration, using defaults");
                ExamConfig::default()
            }
        }
    }

    fn save(&self, cfg: &ExamConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
