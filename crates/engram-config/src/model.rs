// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Engram memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Engram configuration.
///
/// Loaded from TOML with environment variable overrides. All sections are
/// optional and default to sensible values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngramConfig {
    /// Engine behaviour settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Embedding service settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Token budget settings.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Decay policy settings.
    #[serde(default)]
    pub decay: DecayConfig,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            embedding: EmbeddingConfig::default(),
            storage: StorageConfig::default(),
            budget: BudgetConfig::default(),
            decay: DecayConfig::default(),
        }
    }
}

/// Engine behaviour configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Master switch; `false` makes every hook a no-op.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Messages buffered before an episode flush.
    #[serde(default = "default_episode_batch_size")]
    pub episode_batch_size: usize,

    /// Upper bound on the theme count; at the cap new facts always join
    /// their nearest existing theme.
    #[serde(default = "default_max_themes")]
    pub max_themes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            episode_batch_size: default_episode_batch_size(),
            max_themes: default_max_themes(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_episode_batch_size() -> usize {
    5
}

fn default_max_themes() -> usize {
    50
}

/// Embedding service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Jina API key. `None` falls back to the `JINA_API_KEY` environment
    /// variable; absent entirely, the engine stays dormant.
    #[serde(default)]
    pub jina_api_key: Option<String>,

    /// Embedding model identifier.
    #[serde(default = "default_jina_model")]
    pub jina_model: String,

    /// Embedding vector dimensions.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            jina_api_key: None,
            jina_model: default_jina_model(),
            dimensions: default_dimensions(),
        }
    }
}

fn default_jina_model() -> String {
    "jina-embeddings-v5-text-small".to_string()
}

fn default_dimensions() -> usize {
    1024
}

/// Vector store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the database directory or file. `None` falls back to the
    /// `LANCEDB_PATH` environment variable, then to `./engram.db`.
    #[serde(default)]
    pub db_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: None }
    }
}

/// Token budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Token budget for the retrieval injection produced per prompt.
    #[serde(default = "default_retrieval_budget")]
    pub token_budget: u32,

    /// Total budget for the global priority-tier allocator.
    #[serde(default = "default_global_budget")]
    pub global_budget: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            token_budget: default_retrieval_budget(),
            global_budget: default_global_budget(),
        }
    }
}

fn default_retrieval_budget() -> u32 {
    500
}

fn default_global_budget() -> u32 {
    4000
}

/// Decay policy configuration. Half-lives in days; themes never decay.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DecayConfig {
    /// Episode half-life; episodes are deleted at three half-lives.
    #[serde(default = "default_episode_half_life")]
    pub episode_half_life_days: f64,

    /// Semantic fact half-life.
    #[serde(default = "default_semantic_half_life")]
    pub semantic_half_life_days: f64,

    /// Days before an episode's raw-message blob is blanked.
    #[serde(default = "default_message_retain")]
    pub message_retain_days: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            episode_half_life_days: default_episode_half_life(),
            semantic_half_life_days: default_semantic_half_life(),
            message_retain_days: default_message_retain(),
        }
    }
}

fn default_episode_half_life() -> f64 {
    30.0
}

fn default_semantic_half_life() -> f64 {
    180.0
}

fn default_message_retain() -> f64 {
    7.0
}
