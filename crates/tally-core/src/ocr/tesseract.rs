//! OCR backend shelling out to the `tesseract` command-line tool.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::OcrError;

use super::{Detection, OcrBackend};

/// TSV row level for individual words.
const WORD_LEVEL: u32 = 5;

/// OCR backend running `tesseract <image> stdout tsv`.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    program: String,
    languages: String,
}

impl TesseractBackend {
    /// Create a backend recognizing the given `+`-separated languages.
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            program: "tesseract".to_string(),
            languages: languages.into(),
        }
    }

    /// Use a specific tesseract executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn run_tsv(&self, path: &Path) -> Result<String, OcrError> {
        let output = Command::new(&self.program)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("tsv")
            .output()
            .map_err(|e| OcrError::Backend(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::UnreadableImage {
                path: path.display().to_string(),
                reason: format!("tesseract failed: {}", stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn detect(&self, path: &Path) -> Result<Vec<Detection>, OcrError> {
        let tsv = self.run_tsv(path)?;
        let detections = parse_tsv(&tsv);
        debug!("tesseract returned {} lines", detections.len());
        Ok(detections)
    }
}

struct LineAccumulator {
    key: (u32, u32, u32, u32),
    words: Vec<String>,
    confidences: Vec<f32>,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl LineAccumulator {
    fn into_detection(self) -> Detection {
        let confidence = if self.confidences.is_empty() {
            0.0
        } else {
            self.confidences.iter().sum::<f32>() / self.confidences.len() as f32 / 100.0
        };
        Detection {
            region: [
                self.left,
                self.top,
                self.right,
                self.top,
                self.right,
                self.bottom,
                self.left,
                self.bottom,
            ],
            text: self.words.join(" "),
            confidence,
        }
    }
}

/// Group word rows into lines, keeping the order tesseract emitted them in.
fn parse_tsv(tsv: &str) -> Vec<Detection> {
    let mut lines: Vec<LineAccumulator> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        if cols[0].parse::<u32>().ok() != Some(WORD_LEVEL) {
            continue;
        }

        let text = cols[11].trim();
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let key = (num(1), num(2), num(3), num(4));
        let (left, top) = (num(6) as f32, num(7) as f32);
        let (right, bottom) = (left + num(8) as f32, top + num(9) as f32);

        match lines.last_mut() {
            Some(line) if line.key == key => {
                line.words.push(text.to_string());
                line.confidences.push(conf);
                line.left = line.left.min(left);
                line.top = line.top.min(top);
                line.right = line.right.max(right);
                line.bottom = line.bottom.max(bottom);
            }
            _ => lines.push(LineAccumulator {
                key,
                words: vec![text.to_string()],
                confidences: vec![conf],
                left,
                top,
                right,
                bottom,
            }),
        }
    }

    lines.into_iter().map(LineAccumulator::into_detection).collect()
}
