// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Engram engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter behind a port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Embedding,
    Summarizer,
    VectorStore,
}

/// Role of a conversation message fed into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    /// Convert to string for blob storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    /// Parse from a stored string; unknown roles map to `Tool`.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::Tool,
        }
    }
}

/// A single conversation message as handed over by the host at `agent_end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced the message.
    pub role: MessageRole,
    /// Message body.
    pub content: String,
    /// Milliseconds since the epoch; `None` means "now" at ingest time.
    pub timestamp_ms: Option<i64>,
}

impl ChatMessage {
    /// Convenience constructor without a timestamp.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp_ms: None,
        }
    }
}

/// Task hint for the embedding service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingTask {
    /// Embedding a retrieval query.
    Query,
    /// Embedding stored text for matching.
    TextMatching,
}

impl EmbeddingTask {
    /// Wire value expected by embedding APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingTask::Query => "query",
            EmbeddingTask::TextMatching => "text-matching",
        }
    }
}

/// Input for an embedding adapter. Batch form: one vector per text.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
    pub task: EmbeddingTask,
}

/// Output from an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

/// Context bundle returned by `before_prompt_build` for prompt injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInjection {
    /// Rendered system-prompt block to prepend.
    pub system_prompt: String,
    /// Estimated token cost of the injection.
    pub tokens: u32,
}

/// Autonomous memory-edit decision emitted by the toolkit each turn.
///
/// An explicit tagged union rather than dynamic dispatch: the executor
/// matches on the variant and applies it against whichever host callbacks
/// are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryDecision {
    /// Persist a new fact via the host `memoryStore` callback.
    Store {
        content: String,
        category: String,
        importance: f64,
    },
    /// Pull existing facts matching a query back into the working set.
    Retrieve { query: String },
    /// Replace the content of a previously stored fact.
    Update { target: String, content: String },
    /// Forget stored facts matching a query via `memoryForget`.
    Discard { query: String },
    /// Consolidate a cluster of overlapping facts into one entry.
    Summarize {
        sources: Vec<String>,
        summary: String,
        importance: f64,
    },
}

/// A row crossing the vector-store port boundary.
///
/// List-valued columns are serialised inside `fields` as JSON strings;
/// the vector column travels separately so stores can index it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Opaque collision-resistant id, stable across restarts.
    pub id: String,
    /// Embedding vector (may be all zeros for seed rows).
    pub vector: Vec<f32>,
    /// Scalar and serialised-list columns.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StoredRecord {
    /// Create a record with an empty field map.
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            fields: serde_json::Map::new(),
        }
    }

    /// Set a field, consuming and returning self for chaining.
    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Read a string field, defaulting to empty.
    pub fn str_field(&self, key: &str) -> String {
        self.fields
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Read an integer field, defaulting to zero.
    pub fn i64_field(&self, key: &str) -> i64 {
        self.fields.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    /// Read a JSON-string list field, defaulting to empty.
    pub fn list_field(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }
}

/// Serialise a string list for storage in a record field.
pub fn list_to_field(list: &[String]) -> serde_json::Value {
    serde_json::Value::String(serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string()))
}

/// A record returned from vector search with its query similarity.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: StoredRecord,
    pub similarity: f32,
}
