// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engram: a hierarchical conversational-memory engine sitting between a
//! chat agent and its language model.
//!
//! Before each model call the engine injects a small, relevance-ranked
//! bundle of prior context; after each call it distils the exchange into
//! a four-tier self-organising memory (messages → episodes → semantic
//! facts → themes).
//!
//! ## Wiring
//!
//! ```no_run
//! # async fn demo() -> Result<(), engram::EngramError> {
//! let config = engram::load_config().map_err(|e| engram::EngramError::Config(e.to_string()))?;
//! let engine = engram::init(config, None, engram::ExternalTools::default()).await?;
//! # let cancel = tokio_util::sync::CancellationToken::new();
//! if let Some(injection) = engine.before_prompt_build("session-1", "what did we decide?", &cancel).await {
//!     println!("{}", injection.system_prompt);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use engram_jina::JinaEmbedder;
use engram_store::SqliteVectorStore;
use tracing::info;

pub use engram_config::{load_config, load_config_from_path, load_config_from_str, EngramConfig};
pub use engram_context::{BudgetItem, BudgetManager, BudgetTier, OutputCompactor};
pub use engram_core::{
    ChatMessage, EmbeddingAdapter, EngramError, ExternalTools, MemoryDecision, MessageRole,
    PromptInjection, SummarizerAdapter, VectorStoreAdapter,
};
pub use engram_memory::{MemoryEngine, RetrievalBundle, Stage2Decision};

/// Build a ready engine from configuration.
///
/// Opens (or creates) the vector store at the configured path and wires
/// the Jina embedder when an API key is present. Without a key the
/// engine is constructed dormant: hooks no-op and log once, per the
/// config-missing error policy.
pub async fn init(
    config: EngramConfig,
    summarizer: Option<Arc<dyn SummarizerAdapter>>,
    tools: ExternalTools,
) -> Result<MemoryEngine, EngramError> {
    let db_path = config
        .storage
        .db_path
        .clone()
        .unwrap_or_else(|| "./engram.db".to_string());
    let store = Arc::new(SqliteVectorStore::open(Some(&db_path)).await?);

    let embedder: Option<Arc<dyn EmbeddingAdapter>> = match &config.embedding.jina_api_key {
        Some(key) if !key.is_empty() => Some(Arc::new(JinaEmbedder::new(
            key,
            config.embedding.jina_model.clone(),
            config.embedding.dimensions,
        )?)),
        _ => {
            info!("no embedding API key configured; engram will stay dormant");
            None
        }
    };

    Ok(MemoryEngine::new(
        config,
        store,
        embedder,
        summarizer,
        tools,
    ))
}
