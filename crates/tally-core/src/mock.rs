//! Mock OCR backend and completion client for testing.
//!
//! Available in this crate's tests and, for downstream crates, behind the
//! `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! tally-core = { path = "../tally-core", features = ["test-utils"] }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ModelError, OcrError};
use crate::llm::CompletionClient;
use crate::ocr::{Detection, OcrBackend};

/// OCR backend returning canned lines and recording the paths it was given.
#[derive(Debug, Default)]
pub struct MockOcrBackend {
    lines: Vec<String>,
    failure: Option<String>,
    seen: Mutex<Vec<PathBuf>>,
}

impl MockOcrBackend {
    /// Report `lines` as detections, in order.
    pub fn with_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Fail every call with a recognition error.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Paths passed to [`OcrBackend::detect`], in call order.
    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl OcrBackend for MockOcrBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn detect(&self, path: &Path) -> Result<Vec<Detection>, OcrError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(path.to_path_buf());
        }
        if let Some(reason) = &self.failure {
            return Err(OcrError::Recognition(reason.clone()));
        }
        Ok(self
            .lines
            .iter()
            .map(|text| Detection {
                region: [0.0; 8],
                text: text.clone(),
                confidence: 1.0,
            })
            .collect())
    }
}

/// What a [`MockCompletionClient`] answers with.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this completion text (trimmed, like a real client).
    Text(String),
    /// Fail as if the service were unreachable.
    Unavailable,
    /// Fail as if the service did not answer within `Duration`.
    Timeout(Duration),
}

/// Completion client returning a canned reply and recording prompts.
#[derive(Debug)]
pub struct MockCompletionClient {
    reply: MockReply,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletionClient {
    /// Answer every prompt with `text`.
    pub fn with_response(text: impl Into<String>) -> Self {
        Self::with_reply(MockReply::Text(text.into()))
    }

    /// Answer every prompt with `reply`.
    pub fn with_reply(reply: MockReply) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        match &self.reply {
            MockReply::Text(text) => Ok(text.trim().to_string()),
            MockReply::Unavailable => Err(ModelError::Unavailable {
                endpoint: "mock://".to_string(),
                reason: "connection refused".to_string(),
            }),
            MockReply::Timeout(bound) => Err(ModelError::Timeout(*bound)),
        }
    }
}
