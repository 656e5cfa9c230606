//! Error types for the tally-core library.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Main error type for the tally library.
#[derive(Error, Debug)]
pub enum TallyError {
    /// Image decoding or normalization error.
    #[error("image error: {0}")]
    Image(#[from] ImageError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Completion service error.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Completion text could not be turned into an invoice record.
    #[error("malformed model output: {0}")]
    Parse(#[from] ParseError),

    /// I/O error on the staging area.
    #[error("staging error: {0}")]
    Staging(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TallyError {
    /// Classify the error for the calling collaborator.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Image(ImageError::Decode(_)) => ErrorKind::Decode,
            Self::Image(ImageError::Encode(_)) | Self::Image(ImageError::Io(_)) => {
                ErrorKind::Staging
            }
            Self::Ocr(_) => ErrorKind::OcrFailure,
            Self::Model(ModelError::Timeout(_)) => ErrorKind::ModelTimeout,
            Self::Model(_) => ErrorKind::ModelUnavailable,
            Self::Parse(_) => ErrorKind::MalformedModelOutput,
            Self::Staging(_) => ErrorKind::Staging,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

/// Coarse error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Input bytes are not a decodable image.
    #[serde(rename = "DecodeError")]
    Decode,
    /// The OCR backend failed or could not read the image.
    #[serde(rename = "OCRFailure")]
    OcrFailure,
    /// The completion service could not be reached or answered with an error.
    #[serde(rename = "ModelUnavailableError")]
    ModelUnavailable,
    /// The completion service did not answer within its bound.
    #[serde(rename = "ModelTimeoutError")]
    ModelTimeout,
    /// The completion was not a JSON object matching the record schema.
    #[serde(rename = "MalformedModelOutputError")]
    MalformedModelOutput,
    /// Staging storage could not be written or read.
    #[serde(rename = "StagingError")]
    Staging,
    /// Invalid configuration.
    #[serde(rename = "ConfigError")]
    Config,
    /// Input rejected by the caller before reaching the pipeline (unreadable
    /// or empty file, unusable name). Never produced by [`TallyError::kind`].
    #[serde(rename = "InvalidInputError")]
    InvalidInput,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 8] = [
        Self::Decode,
        Self::OcrFailure,
        Self::ModelUnavailable,
        Self::ModelTimeout,
        Self::MalformedModelOutput,
        Self::Staging,
        Self::Config,
        Self::InvalidInput,
    ];

    /// Stable name of the kind, as it appears in serialized error reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "DecodeError",
            Self::OcrFailure => "OCRFailure",
            Self::ModelUnavailable => "ModelUnavailableError",
            Self::ModelTimeout => "ModelTimeoutError",
            Self::MalformedModelOutput => "MalformedModelOutputError",
            Self::Staging => "StagingError",
            Self::Config => "ConfigError",
            Self::InvalidInput => "InvalidInputError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors related to image decoding and normalization.
#[derive(Error, Debug)]
pub enum ImageError {
    /// The bytes are not a valid image.
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),

    /// The normalized image could not be encoded.
    #[error("failed to encode normalized image: {0}")]
    Encode(image::ImageError),

    /// The normalized image could not be written.
    #[error("failed to write normalized image: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The image file could not be read by the backend.
    #[error("unreadable image {path}: {reason}")]
    UnreadableImage { path: String, reason: String },

    /// Text detection or recognition failed.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The OCR backend process could not be run.
    #[error("backend unavailable: {0}")]
    Backend(String),
}

/// Errors related to the completion service.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The service could not be reached.
    #[error("service unreachable at {endpoint}: {reason}")]
    Unavailable { endpoint: String, reason: String },

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered with a body that is not a completion envelope.
    #[error("invalid completion envelope: {0}")]
    Envelope(String),

    /// No answer within the configured bound.
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Errors related to parsing a completion into an invoice record.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The completion is not valid JSON.
    #[error("not valid JSON ({source}); completion starts with {excerpt:?}")]
    NotJson {
        source: serde_json::Error,
        excerpt: String,
    },

    /// The completion is valid JSON but not an object.
    #[error("expected a JSON object, found {found}")]
    NotObject { found: &'static str },

    /// The object does not match the invoice record schema.
    #[error("schema mismatch: {0}")]
    Schema(serde_json::Error),
}

/// Result type for the tally library.
pub type Result<T> = std::result::Result<T, TallyError>;
