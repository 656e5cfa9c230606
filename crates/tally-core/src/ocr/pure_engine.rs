//! Pure Rust OCR backend using `pure-onnx-ocr`.

use std::path::Path;

use tracing::{debug, info};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

use super::{Detection, OcrBackend};

/// OCR backend running PaddleOCR ONNX models without an external runtime.
pub struct PureOnnxBackend {
    engine: pure_onnx_ocr::engine::OcrEngine,
    keep_unk: bool,
}

impl PureOnnxBackend {
    /// Load detection and recognition models named in `config` from its model directory.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let det_path = config.model_path(&config.detection_model);
        let rec_path = config.model_path(&config.recognition_model);
        let dict_path = config.model_path(&config.dictionary);

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "missing model file {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!(
            "Loaded pure-onnx-ocr engine from {}",
            config.model_dir.display()
        );

        Ok(Self {
            engine,
            keep_unk: config.keep_unk,
        })
    }
}

impl OcrBackend for PureOnnxBackend {
    fn name(&self) -> &str {
        "pure-onnx-ocr"
    }

    fn detect(&self, path: &Path) -> Result<Vec<Detection>, OcrError> {
        let image = image::open(path).map_err(|e| OcrError::UnreadableImage {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let results = self
            .engine
            .run_from_image(&image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;

        debug!("pure-onnx-ocr returned {} text regions", results.len());

        Ok(results
            .iter()
            .map(|r| Detection {
                region: polygon_to_region(&r.bounding_box),
                text: if self.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                },
                confidence: r.confidence,
            })
            .collect())
    }
}

/// Convert a `Polygon<f64>` to `[x1, y1, x2, y2, x3, y3, x4, y4]` using its
/// first four exterior points.
fn polygon_to_region(polygon: &pure_onnx_ocr::Polygon<f64>) -> [f32; 8] {
    let mut region = [0.0f32; 8];
    for (i, coord) in polygon.exterior().coords().take(4).enumerate() {
        region[i * 2] = coord.x as f32;
        region[i * 2 + 1] = coord.y as f32;
    }
    region
}
