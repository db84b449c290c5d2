// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Engram port architecture.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility. Host-provided
//! tool ports live in [`tools`] and are optional by design.

pub mod adapter;
pub mod embedding;
pub mod store;
pub mod summarizer;
pub mod tools;

// Re-export all traits at the traits module level for convenience.
pub use adapter::PluginAdapter;
pub use embedding::EmbeddingAdapter;
pub use store::{Table, VectorStoreAdapter};
pub use summarizer::SummarizerAdapter;
pub use tools::{ExternalTools, MemoryTool, WebSearchTool, WorkspaceTool};
