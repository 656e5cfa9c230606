//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::TallyError;

/// Main configuration for the tally pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Completion service configuration.
    pub model: ModelConfig,

    /// Staging storage configuration.
    pub staging: StagingConfig,
}

/// Which OCR backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrBackendKind {
    /// PaddleOCR ONNX models through `pure-onnx-ocr`.
    PureOnnx,
    /// The `tesseract` command-line tool.
    Tesseract,
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Backend used for detection and recognition.
    pub backend: OcrBackendKind,

    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,

    /// Keep `[UNK]` tokens in recognized text instead of replacing them with spaces.
    pub keep_unk: bool,

    /// Languages passed to tesseract (`-l`).
    pub tesseract_languages: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::PureOnnx,
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
            keep_unk: false,
            tesseract_languages: "eng".to_string(),
        }
    }
}

impl OcrConfig {
    /// Get full path to a model file.
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.model_dir.join(model_name)
    }
}

/// Completion service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the Ollama-compatible service.
    pub endpoint: String,

    /// Model name to request.
    pub model: String,

    /// Upper bound for one completion request, in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434".to_string(),
            model: "mistral".to_string(),
            timeout_secs: 120,
        }
    }
}

impl ModelConfig {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Staging storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory under which per-request staging directories are created.
    /// Defaults to the system temp directory.
    pub root: Option<PathBuf>,
}

impl StagingConfig {
    /// Resolved staging root.
    pub fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl TallyConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check values that would otherwise only fail mid-request.
    pub fn validate(&self) -> Result<(), TallyError> {
        let url = reqwest::Url::parse(&self.model.endpoint).map_err(|e| {
            TallyError::Config(format!("invalid model endpoint {:?}: {}", self.model.endpoint, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TallyError::Config(format!(
                "model endpoint must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.model.model.trim().is_empty() {
            return Err(TallyError::Config("model name is empty".to_string()));
        }
        if self.model.timeout_secs == 0 {
            return Err(TallyError::Config("model timeout must be positive".to_string()));
        }
        if self.ocr.backend == OcrBackendKind::Tesseract
            && self.ocr.tesseract_languages.trim().is_empty()
        {
            return Err(TallyError::Config("tesseract languages are empty".to_string()));
        }
        Ok(())
    }
}
