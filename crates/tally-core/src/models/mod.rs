//! Data models and configuration.

pub mod config;
pub mod record;

pub use config::{ModelConfig, OcrBackendKind, OcrConfig, StagingConfig, TallyConfig};
pub use record::{FieldGuide, InvoiceRecord, RawDocument, UnitEntry, FIELD_GUIDE};
