//! OCR stage: image normalization, text detection and recognition backends.

mod engine;
mod preprocessing;
#[cfg(feature = "native")]
mod pure_engine;
mod tesseract;

pub use engine::OcrEngine;
pub use preprocessing::{ImageNormalizer, ImageProbe, NormalizedImage, NORMALIZED_SUFFIX};
#[cfg(feature = "native")]
pub use pure_engine::PureOnnxBackend;
pub use tesseract::TesseractBackend;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::models::config::{OcrBackendKind, OcrConfig};

/// A recognized text fragment as reported by an OCR backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding quadrilateral (x1, y1, x2, y2, x3, y3, x4, y4).
    pub region: [f32; 8],

    /// Recognized text content.
    pub text: String,

    /// Recognition confidence score (0.0 - 1.0).
    pub confidence: f32,
}

/// Trait for OCR backends.
///
/// Backends read the image from a file path and report detections in their
/// native order. That order is not guaranteed to be visual reading order.
pub trait OcrBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Detect and recognize text in the image at `path`.
    fn detect(&self, path: &Path) -> Result<Vec<Detection>, OcrError>;
}

impl<B: OcrBackend + ?Sized> OcrBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect(&self, path: &Path) -> Result<Vec<Detection>, OcrError> {
        (**self).detect(path)
    }
}

/// Create the backend selected in `config`.
pub fn create_backend(config: &OcrConfig) -> Result<Box<dyn OcrBackend>, OcrError> {
    match config.backend {
        #[cfg(feature = "native")]
        OcrBackendKind::PureOnnx => Ok(Box::new(PureOnnxBackend::from_config(config)?)),
        #[cfg(not(feature = "native"))]
        OcrBackendKind::PureOnnx => Err(OcrError::ModelLoad(
            "pure-onnx backend requires the `native` feature".to_string(),
        )),
        OcrBackendKind::Tesseract => Ok(Box::new(TesseractBackend::new(
            config.tesseract_languages.clone(),
        ))),
    }
}

/// Recognized lines in detection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrText {
    lines: Vec<String>,
}

impl OcrText {
    /// Keep only the text of each detection, preserving order.
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        Self {
            lines: detections.into_iter().map(|d| d.text).collect(),
        }
    }

    /// Recognized lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether nothing was recognized.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines joined with newlines.
    pub fn as_text(&self) -> String {
        self.lines.join("\n")
    }
}

impl From<&str> for OcrText {
    fn from(text: &str) -> Self {
        Self {
            lines: if text.is_empty() {
                Vec::new()
            } else {
                text.split('\n').map(str::to_string).collect()
            },
        }
    }
}

impl std::fmt::Display for OcrText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_text())
    }
}
