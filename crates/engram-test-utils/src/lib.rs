// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Engram workspace: deterministic mock adapters
//! and a harness wiring a complete engine over an in-memory store.

pub mod harness;
pub mod mock_embedder;
pub mod mock_summarizer;
pub mod mock_tools;

pub use harness::{MemoryHarness, MemoryHarnessBuilder};
pub use mock_embedder::MockEmbedder;
pub use mock_summarizer::MockSummarizer;
pub use mock_tools::{FixedWebTool, FixedWorkspaceTool, RecordingMemoryTool};
