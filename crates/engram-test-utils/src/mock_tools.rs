// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording host-tool mocks for exercising the toolkit and active
//! retrieval paths end to end.

use std::sync::Mutex;

use async_trait::async_trait;
use engram_core::{EngramError, MemoryTool, WebSearchTool, WorkspaceTool};

/// In-memory host memory callback that records stores and forgets.
#[derive(Debug, Default)]
pub struct RecordingMemoryTool {
    entries: Mutex<Vec<String>>,
    stored: Mutex<Vec<(String, String, f64)>>,
    forgotten: Mutex<Vec<String>>,
}

impl RecordingMemoryTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed recallable entries.
    pub fn with_entries(entries: Vec<String>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    /// `(content, category, importance)` triples stored so far.
    pub fn stored(&self) -> Vec<(String, String, f64)> {
        self.stored.lock().unwrap().clone()
    }

    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryTool for RecordingMemoryTool {
    async fn recall(&self, _query: &str) -> Result<Vec<String>, EngramError> {
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn store(
        &self,
        content: &str,
        category: &str,
        importance: f64,
    ) -> Result<(), EngramError> {
        self.entries.lock().unwrap().push(content.to_string());
        self.stored
            .lock()
            .unwrap()
            .push((content.to_string(), category.to_string(), importance));
        Ok(())
    }

    async fn forget(&self, query: &str) -> Result<(), EngramError> {
        self.entries.lock().unwrap().retain(|e| e != query);
        self.forgotten.lock().unwrap().push(query.to_string());
        Ok(())
    }
}

/// Workspace grep returning a fixed result set.
#[derive(Debug, Default)]
pub struct FixedWorkspaceTool {
    pub hits: Vec<String>,
}

#[async_trait]
impl WorkspaceTool for FixedWorkspaceTool {
    async fn grep(&self, _pattern: &str) -> Result<Vec<String>, EngramError> {
        Ok(self.hits.clone())
    }
}

/// Web search returning fixed snippets.
#[derive(Debug, Default)]
pub struct FixedWebTool {
    pub snippets: Vec<String>,
}

#[async_trait]
impl WebSearchTool for FixedWebTool {
    async fn search(&self, _query: &str) -> Result<Vec<String>, EngramError> {
        Ok(self.snippets.clone())
    }
}
