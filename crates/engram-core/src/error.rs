// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Engram memory engine.

use thiserror::Error;

/// The primary error type used across all Engram adapter traits and core operations.
#[derive(Debug, Error)]
pub enum EngramError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Vector-store backend errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Embedding service errors (API failure, dimension mismatch, empty output).
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Summarizer / LLM errors (API failure, empty completion).
    #[error("summarizer error: {message}")]
    Summarizer {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An optional host tool (memory, workspace grep, web search,
    /// summarizer) is not configured. The dependent feature disables
    /// silently.
    #[error("host tool '{tool}' not configured")]
    HostToolMissing { tool: String },

    /// Outbound call exceeded its deadline. Treated like a transient 5xx.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A model response or stored blob could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngramError {
    /// Whether this error is transient (timeouts and upstream I/O failures).
    ///
    /// Transient errors are swallowed at the hook boundary: retrieval returns
    /// empty and build steps skip the turn instead of breaking the prompt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngramError::Timeout { .. }
                | EngramError::Embedding { .. }
                | EngramError::Summarizer { .. }
        )
    }
}
