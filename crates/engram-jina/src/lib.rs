// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Jina embeddings API client implementing the Engram embedding port.

pub mod client;
pub mod types;

pub use client::JinaEmbedder;
