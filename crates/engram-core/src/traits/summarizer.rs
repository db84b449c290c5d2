// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Summarizer adapter trait: a cheap text-to-text function.

use async_trait::async_trait;

use crate::error::EngramError;
use crate::traits::adapter::PluginAdapter;

/// Adapter for the cheap text-to-text model used for summarisation,
/// fact extraction, theme naming, and the Stage-II sufficiency probe.
#[async_trait]
pub trait SummarizerAdapter: PluginAdapter {
    /// Completes a prompt, returning plain text.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, EngramError>;
}
