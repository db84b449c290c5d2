// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host-provided tool ports used opportunistically by active retrieval
//! and the memory toolkit.
//!
//! Every port is optional. The engine checks `ExternalTools` fields
//! explicitly (an options record, not dynamic dispatch on method
//! presence); an absent port disables the feature silently.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngramError;

/// Host memory callbacks: recall / store / forget.
#[async_trait]
pub trait MemoryTool: Send + Sync {
    /// Recall stored memory entries matching a query.
    async fn recall(&self, query: &str) -> Result<Vec<String>, EngramError>;

    /// Persist a new memory entry.
    async fn store(
        &self,
        content: &str,
        category: &str,
        importance: f64,
    ) -> Result<(), EngramError>;

    /// Forget stored entries matching a query.
    async fn forget(&self, query: &str) -> Result<(), EngramError>;
}

/// Host workspace search (typically a bounded grep).
#[async_trait]
pub trait WorkspaceTool: Send + Sync {
    /// Search workspace files for a pattern, returning matching lines.
    async fn grep(&self, pattern: &str) -> Result<Vec<String>, EngramError>;
}

/// Host web search.
#[async_trait]
pub trait WebSearchTool: Send + Sync {
    /// Search the web, returning result snippets.
    async fn search(&self, query: &str) -> Result<Vec<String>, EngramError>;
}

/// The capability set the host chose to expose. Any subset may be absent.
#[derive(Clone, Default)]
pub struct ExternalTools {
    pub memory: Option<Arc<dyn MemoryTool>>,
    pub workspace: Option<Arc<dyn WorkspaceTool>>,
    pub web: Option<Arc<dyn WebSearchTool>>,
}

impl ExternalTools {
    /// True when no capability at all is present.
    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.workspace.is_none() && self.web.is_none()
    }
}
