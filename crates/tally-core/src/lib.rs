//! Core library for invoice image extraction.
//!
//! This crate provides:
//! - Image normalization to RGB PNG in per-request staging storage
//! - OCR through PaddleOCR ONNX models or the tesseract CLI
//! - Prompt rendering and strict parsing of the invoice record schema
//! - A completion client for a local Ollama service
//! - The [`Pipeline`] tying the stages together

pub mod error;
pub mod invoice;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod staging;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::{ErrorKind, Result, TallyError};
pub use invoice::{PromptBuilder, ResponseParser, PROMPT_VERSION};
pub use llm::{CompletionClient, OllamaClient};
pub use models::config::TallyConfig;
pub use models::record::{InvoiceRecord, RawDocument, UnitEntry};
pub use ocr::{Detection, ImageNormalizer, OcrBackend, OcrEngine, OcrText};
#[cfg(feature = "native")]
pub use ocr::PureOnnxBackend;
pub use pipeline::{ExtractionResult, Pipeline, PipelineState};
pub use staging::StagingArea;
