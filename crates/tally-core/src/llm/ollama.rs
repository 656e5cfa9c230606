//! Completion client for a local Ollama service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ModelError;
use crate::models::config::ModelConfig;

use super::CompletionClient;

/// Characters of an error body kept in status errors.
const ERROR_BODY_CHARS: usize = 200;

/// Ollama `/api/generate` client with sampling temperature fixed at zero.
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    /// Create a client for `model` at `endpoint`, bounding each request by `timeout`.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let endpoint = endpoint.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Unavailable {
                endpoint: endpoint.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        })
    }

    /// Create a client from configuration.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        Self::new(&config.endpoint, &config.model, config.timeout())
    }

    /// Model requested from the service.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_error(&self, error: reqwest::Error) -> ModelError {
        if error.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else {
            ModelError::Unavailable {
                endpoint: self.endpoint.clone(),
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let start = Instant::now();

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending request to Ollama");

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let text = response.text().await.map_err(|e| self.request_error(e))?;
        let completion: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::Envelope(e.to_string()))?;

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            completion_chars = completion.response.len(),
            "Received completion"
        );

        Ok(completion.response.trim().to_string())
    }
}
