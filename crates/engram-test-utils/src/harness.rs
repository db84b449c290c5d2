// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness assembling a complete engine with mock adapters and an
//! in-memory store.

use std::sync::Arc;

use engram_config::EngramConfig;
use engram_core::{EngramError, ExternalTools};
use engram_memory::MemoryEngine;
use engram_store::SqliteVectorStore;

use crate::mock_embedder::MockEmbedder;
use crate::mock_summarizer::MockSummarizer;

/// Builder for test environments with configurable options.
pub struct MemoryHarnessBuilder {
    responses: Vec<String>,
    config: EngramConfig,
    tools: ExternalTools,
    dimensions: usize,
}

impl MemoryHarnessBuilder {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
            config: EngramConfig::default(),
            tools: ExternalTools::default(),
            dimensions: 32,
        }
    }

    /// Queue scripted summarizer responses.
    pub fn with_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Override the engine configuration.
    pub fn with_config(mut self, config: EngramConfig) -> Self {
        self.config = config;
        self
    }

    /// Provide host tool callbacks.
    pub fn with_tools(mut self, tools: ExternalTools) -> Self {
        self.tools = tools;
        self
    }

    /// Mock embedding dimensionality (default 32).
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Build the harness with an in-memory store.
    pub async fn build(self) -> Result<MemoryHarness, EngramError> {
        let store = Arc::new(SqliteVectorStore::open(None).await?);
        let embedder = Arc::new(MockEmbedder::new(self.dimensions));
        let summarizer = Arc::new(MockSummarizer::new());
        for response in &self.responses {
            summarizer.push_response(response);
        }

        let engine = MemoryEngine::new(
            self.config,
            store.clone(),
            Some(embedder.clone()),
            Some(summarizer.clone()),
            self.tools,
        );

        Ok(MemoryHarness {
            engine: Arc::new(engine),
            store,
            embedder,
            summarizer,
        })
    }
}

/// A fully wired engine over mocks, for end-to-end tests.
pub struct MemoryHarness {
    pub engine: Arc<MemoryEngine>,
    pub store: Arc<SqliteVectorStore>,
    pub embedder: Arc<MockEmbedder>,
    pub summarizer: Arc<MockSummarizer>,
}

impl MemoryHarness {
    pub fn builder() -> MemoryHarnessBuilder {
        MemoryHarnessBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_builds_with_defaults() {
        let harness = MemoryHarness::builder().build().await.unwrap();
        assert!(!harness.engine.is_dormant());
    }

    #[tokio::test]
    async fn harness_scripted_responses_flow_through() {
        use engram_core::SummarizerAdapter;
        let harness = MemoryHarness::builder()
            .with_responses(vec!["scripted".to_string()])
            .build()
            .await
            .unwrap();
        let response = harness.summarizer.complete("prompt", 16).await.unwrap();
        assert_eq!(response, "scripted");
    }
}
