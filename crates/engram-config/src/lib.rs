// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Engram memory engine.
//!
//! TOML model with figment-based layered loading and environment
//! overrides. See [`model::EngramConfig`] for the schema.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    BudgetConfig, DecayConfig, EmbeddingConfig, EngineConfig, EngramConfig, StorageConfig,
};
