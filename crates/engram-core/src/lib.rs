// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types and adapter traits for the Engram memory engine.
//!
//! Engram is a hierarchical conversational-memory engine sitting between
//! a chat agent and its language model. This crate carries everything the
//! other crates share:
//!
//! - **Error type**: [`EngramError`], one `thiserror` enum for all ports
//! - **Traits**: [`traits::EmbeddingAdapter`], [`traits::SummarizerAdapter`],
//!   [`traits::VectorStoreAdapter`], and the optional host tool ports
//! - **Types**: conversation messages, embedding IO, stored records,
//!   memory-edit decisions, prompt injections
//! - **Vector math**: cosine similarity, centroids, BLOB conversion
//! - **Token estimation**: CJK-aware character-ratio estimates

pub mod error;
pub mod tokens;
pub mod traits;
pub mod types;
pub mod vector;

pub use error::EngramError;
pub use traits::{
    EmbeddingAdapter, ExternalTools, MemoryTool, PluginAdapter, SummarizerAdapter, Table,
    VectorStoreAdapter, WebSearchTool, WorkspaceTool,
};
pub use types::*;
