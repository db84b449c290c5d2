// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hierarchical conversational memory for the Engram engine.
//!
//! A four-tier hierarchy (messages → episodes → semantic facts → themes)
//! with the rules that build, split, merge, and decay it, plus the
//! two-stage retriever that turns a query into a budgeted context bundle.
//!
//! ## Architecture
//!
//! - **EpisodeBuilder**: buffers messages, emits episode summaries
//! - **SemanticExtractor**: distils episodes into deduped reusable facts
//! - **ThemeManager**: assignment, two-means split, small-theme merge,
//!   k-NN graph, distribution-aware gates
//! - **TopDownRetriever**: Stage I coverage selection, Stage II episode
//!   expansion behind a sufficiency probe
//! - **Temporal layer**: semantic-time extraction, durative memories,
//!   temporal reranking
//! - **ActiveRetriever / MemoryToolkit**: uncertainty-driven verification
//!   and autonomous store/discard/consolidate decisions
//! - **DecayManager / FeedbackTuner / Preloader / Observability**: weekly
//!   background maintenance
//! - **MemoryEngine**: the handle owning all of it behind four host hooks

pub mod active;
pub mod decay;
pub mod engine;
pub mod episode;
pub mod extractor;
pub mod feedback;
pub mod observe;
pub mod preload;
pub mod profile;
pub mod retriever;
pub mod stats;
pub mod temporal;
pub mod theme;
pub mod toolkit;
pub mod types;

pub use active::{ActiveRetriever, RetrievalSource, UncertaintyLevel, UncertaintySignal};
pub use decay::{decay_weight, DecayManager, DecaySweepReport};
pub use engine::MemoryEngine;
pub use episode::{AddOutcome, EpisodeBuilder};
pub use extractor::SemanticExtractor;
pub use feedback::FeedbackTuner;
pub use observe::{ObservabilityReport, ObservabilityRing};
pub use preload::{build_preload_rules, preload_hint, PreloadRule};
pub use profile::ProfileBuilder;
pub use retriever::TopDownRetriever;
pub use stats::TailSampler;
pub use temporal::{
    build_durative_memories, extract_semantic_time, parse_temporal_intent, rerank_episodes,
    TemporalEventRing, TemporalIntent,
};
pub use theme::{ThemeManager, KNN_K, MAX_SEMANTICS_PER_THEME, MIN_SEMANTICS_PER_THEME};
pub use toolkit::{MemoryToolkit, ToolkitReport};
pub use types::*;
