// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Jina embeddings API.
//!
//! Provides [`JinaEmbedder`] which handles request construction,
//! authentication, per-call deadlines, and transient error retry.

use std::time::Duration;

use async_trait::async_trait;
use engram_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, EngramError, HealthStatus,
    PluginAdapter,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, EmbeddingsRequest, EmbeddingsResponse};

/// Base URL for the Jina embeddings API.
const API_BASE_URL: &str = "https://api.jina.ai/v1/embeddings";

/// Default per-call deadline. Timeouts surface as [`EngramError::Timeout`],
/// the same error class as a 5xx.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// HTTP client for Jina embedding generation.
///
/// Manages authentication headers, connection pooling, and retry logic
/// for transient errors (429, 5xx).
#[derive(Debug, Clone)]
pub struct JinaEmbedder {
    client: reqwest::Client,
    model: String,
    dimensions: usize,
    deadline: Duration,
    max_retries: u32,
    base_url: String,
}

impl JinaEmbedder {
    /// Creates a new Jina API client.
    pub fn new(api_key: &str, model: String, dimensions: usize) -> Result<Self, EngramError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {api_key}");
        headers.insert(
            "authorization",
            HeaderValue::from_str(&bearer)
                .map_err(|e| EngramError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| EngramError::Embedding {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            model,
            dimensions,
            deadline: DEFAULT_DEADLINE,
            max_retries: 1,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the per-call deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    async fn post_embeddings(
        &self,
        request: &EmbeddingsRequest,
    ) -> Result<EmbeddingsResponse, EngramError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying embeddings request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let send = self.client.post(&self.base_url).json(request).send();
            let response = match tokio::time::timeout(self.deadline, send).await {
                Err(_) => {
                    last_error = Some(EngramError::Timeout {
                        duration: self.deadline,
                    });
                    continue;
                }
                Ok(Err(e)) => {
                    last_error = Some(EngramError::Embedding {
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    });
                    continue;
                }
                Ok(Ok(response)) => response,
            };

            let status = response.status();
            debug!(status = %status, attempt, "embeddings response received");

            if status.is_success() {
                return response.json::<EmbeddingsResponse>().await.map_err(|e| {
                    EngramError::Embedding {
                        message: format!("malformed embeddings response: {e}"),
                        source: Some(Box::new(e)),
                    }
                });
            }

            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!(
                    "Jina API error ({status}): {}",
                    api_err.detail.unwrap_or_default()
                ),
                Err(_) => format!("Jina API returned {status}: {body}"),
            };
            let err = EngramError::Embedding {
                message,
                source: None,
            };

            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, "transient embeddings error, will retry");
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error.unwrap_or_else(|| EngramError::Embedding {
            message: "embeddings request failed with no recorded error".to_string(),
            source: None,
        }))
    }
}

/// Whether an HTTP status should be retried once.
fn is_transient_error(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl PluginAdapter for JinaEmbedder {
    fn name(&self) -> &str {
        "jina-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, EngramError> {
        // No dedicated health endpoint; a configured client is assumed healthy.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), EngramError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for JinaEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, EngramError> {
        if input.texts.is_empty() {
            return Ok(EmbeddingOutput {
                embeddings: vec![],
                dimensions: self.dimensions,
            });
        }

        let request = EmbeddingsRequest {
            model: self.model.clone(),
            task: input.task.as_str().to_string(),
            input: input.texts,
        };
        let expected = request.input.len();

        let mut response = self.post_embeddings(&request).await?;
        if response.data.len() != expected {
            return Err(EngramError::Embedding {
                message: format!(
                    "expected {expected} embeddings, got {}",
                    response.data.len()
                ),
                source: None,
            });
        }

        // The API may return rows out of order; index ties them back.
        response.data.sort_by_key(|row| row.index);
        let embeddings: Vec<Vec<f32>> =
            response.data.into_iter().map(|row| row.embedding).collect();

        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }
}
