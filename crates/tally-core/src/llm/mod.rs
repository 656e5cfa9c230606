//! Text-completion clients used to map OCR text onto the invoice schema.

mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;

use crate::error::ModelError;

/// A deterministic text-completion service.
///
/// Implementations request exactly one completion and return its text with
/// surrounding whitespace removed. Failures are not retried.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Short client name for logs.
    fn name(&self) -> &str;

    /// Complete `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

#[async_trait]
impl<C: CompletionClient + ?Sized> CompletionClient for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        (**self).complete(prompt).await
    }
}
