//! Remote embedding provider backed by an HTTP embedding API.
//!
//! Speaks the Gemini `embedContent` / `batchEmbedContents` protocol. Uses the
//! blocking `reqwest` client so it fits the synchronous [`EmbeddingProvider`]
//! contract; construct and call it from a blocking thread, never directly on
//! an async executor.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

/// Environment variables consulted when no key is configured, in order.
const API_KEY_ENV_VARS: &[&str] = &["MNEMO_EMBEDDING_API_KEY", "GEMINI_API_KEY"];

/// Largest batch accepted by `batchEmbedContents`.
const MAX_BATCH: usize = 100;

pub struct RemoteEmbeddingProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl RemoteEmbeddingProvider {
    /// Fails with [`MemoryError::Configuration`] when no API key is available.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = resolve_api_key(config.api_key.as_deref()).ok_or_else(|| {
            MemoryError::Configuration(format!(
                "remote embedding provider requires an API key (set embedding.api_key or one of {})",
                API_KEY_ENV_VARS.join(", ")
            ))
        })?;

        if config.dimensions == 0 {
            return Err(MemoryError::Configuration(
                "embedding.dimensions must be greater than zero".into(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MemoryError::Configuration(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            model = %config.remote_model,
            dimensions = config.dimensions,
            "remote embedding provider ready"
        );

        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.remote_model.clone(),
            dimensions: config.dimensions,
        })
    }

    fn model_path(&self) -> String {
        format!("models/{}", self.model)
    }

    fn request<'a>(&self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: self.model_path(),
            content: Content {
                parts: vec![Part { text }],
            },
            output_dimensionality: self.dimensions,
        }
    }

    /// POST a JSON body and return the successful response text.
    fn post<B: Serialize>(&self, method: &str, body: &B) -> Result<String> {
        let url = format!("{}/{}:{method}", self.api_base, self.model_path());
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .map_err(|e| MemoryError::Backend(format!("embedding request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| MemoryError::Backend(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&text) {
                return Err(MemoryError::Backend(format!(
                    "embedding API error ({status}): {}",
                    error.error.message
                )));
            }
            return Err(MemoryError::Backend(format!(
                "embedding API error ({status}): {text}"
            )));
        }

        Ok(text)
    }

    fn check_dimensions(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.dimensions {
            return Err(MemoryError::Backend(format!(
                "embedding API returned {} dimensions, expected {}",
                values.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

fn resolve_api_key(configured: Option<&str>) -> Option<String> {
    configured
        .map(str::to_string)
        .or_else(|| {
            API_KEY_ENV_VARS
                .iter()
                .find_map(|var| std::env::var(var).ok())
        })
        .filter(|key| !key.trim().is_empty())
}

fn ensure_non_empty(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(MemoryError::Backend(
            "cannot embed empty or whitespace-only text".into(),
        ));
    }
    Ok(())
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_non_empty(text)?;
        let body = self.post("embedContent", &self.request(text))?;
        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| MemoryError::Backend(format!("failed to parse embedding response: {e}")))?;
        self.check_dimensions(&parsed.embedding.values)?;
        Ok(parsed.embedding.values)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            for text in chunk {
                ensure_non_empty(text)?;
            }
            let request = BatchEmbedRequest {
                requests: chunk.iter().map(|t| self.request(t)).collect(),
            };
            let body = self.post("batchEmbedContents", &request)?;
            let parsed: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
                MemoryError::Backend(format!("failed to parse batch embedding response: {e}"))
            })?;
            if parsed.embeddings.len() != chunk.len() {
                return Err(MemoryError::Backend(format!(
                    "embedding API returned {} vectors for {} inputs",
                    parsed.embeddings.len(),
                    chunk.len()
                )));
            }
            for emb in parsed.embeddings {
                self.check_dimensions(&emb.values)?;
                results.push(emb.values);
            }
            debug!(batch = chunk.len(), "remote batch embedded");
        }
        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
