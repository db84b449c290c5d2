// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted summarizer for tests: queued responses first, then a
//! configurable default, then a deterministic derivation of the prompt.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use engram_core::{AdapterType, EngramError, HealthStatus, PluginAdapter, SummarizerAdapter};

/// Mock LLM with a FIFO response script.
#[derive(Debug, Default)]
pub struct MockSummarizer {
    queue: Mutex<VecDeque<String>>,
    default_response: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A summarizer whose every call errors (for failure-path tests).
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Queue the next scripted response.
    pub fn push_response(&self, response: &str) {
        self.queue.lock().unwrap().push_back(response.to_string());
    }

    /// Response used whenever the queue is empty.
    pub fn set_default_response(&self, response: &str) {
        *self.default_response.lock().unwrap() = Some(response.to_string());
    }

    /// Every prompt seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn derive(prompt: &str) -> String {
        let tail: String = prompt
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("response")
            .chars()
            .take(80)
            .collect();
        format!("summary of: {tail}")
    }
}

#[async_trait]
impl PluginAdapter for MockSummarizer {
    fn name(&self) -> &str {
        "mock-summarizer"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Summarizer
    }

    async fn health_check(&self) -> Result<HealthStatus, EngramError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), EngramError> {
        Ok(())
    }
}

#[async_trait]
impl SummarizerAdapter for MockSummarizer {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, EngramError> {
        if self.fail {
            return Err(EngramError::Summarizer {
                message: "mock summarizer configured to fail".into(),
                source: None,
            });
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(response) = self.queue.lock().unwrap().pop_front() {
            return Ok(response);
        }
        if let Some(default) = self.default_response.lock().unwrap().clone() {
            return Ok(default);
        }
        Ok(Self::derive(prompt))
    }
}
