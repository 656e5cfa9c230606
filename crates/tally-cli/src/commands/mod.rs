//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod ocr;
pub mod process;
pub mod prompt;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use tally_core::{ErrorKind, RawDocument, TallyConfig, TallyError};

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("config.json")
}

/// Load the configuration named by `--config`, else the default file if it
/// exists, else built-in defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<TallyConfig> {
    let path = match config_path {
        Some(path) => PathBuf::from(path),
        None => {
            let path = default_config_path();
            if !path.exists() {
                debug!("No config file at {}, using defaults", path.display());
                return Ok(TallyConfig::default());
            }
            path
        }
    };

    TallyConfig::from_file(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))
}

/// Read an input image, rejecting what the pipeline must never see.
pub fn read_document(path: &Path) -> anyhow::Result<RawDocument> {
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Input has no usable file name: {}", path.display()))?;

    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        anyhow::bail!("Input file is empty: {}", path.display());
    }

    Ok(RawDocument::new(filename, bytes))
}

/// Error body printed in place of a record.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: ErrorKind,
    message: String,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                kind,
                message: message.into(),
            },
        }
    }
}

impl From<&TallyError> for ErrorReport {
    fn from(err: &TallyError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Serialize `value` compactly or pretty-printed.
pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}
