//! OCR engine turning backend detections into plain text.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::OcrError;

use super::{OcrBackend, OcrText};

/// OCR engine wrapping a detection + recognition backend.
///
/// Only the recognized text survives; regions and confidences are dropped.
pub struct OcrEngine<B: OcrBackend> {
    backend: B,
}

impl<B: OcrBackend> OcrEngine<B> {
    /// Create an engine over a backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Access the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Recognize text in the image at `path`.
    ///
    /// Zero detections yield empty text rather than an error.
    pub fn recognize(&self, path: &Path) -> Result<OcrText, OcrError> {
        let start = Instant::now();

        if !path.is_file() {
            return Err(OcrError::UnreadableImage {
                path: path.display().to_string(),
                reason: "no such file".to_string(),
            });
        }

        let detections = self.backend.detect(path)?;
        debug!(
            "{} returned {} text regions",
            self.backend.name(),
            detections.len()
        );

        let text = OcrText::from_detections(detections);

        info!(
            "OCR complete: {} lines in {}ms",
            text.lines().len(),
            start.elapsed().as_millis()
        );

        Ok(text)
    }
}
