// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./engram.toml` > `~/.config/engram/engram.toml`
//! > `/etc/engram/engram.toml`, with environment variable overrides via the
//! `ENGRAM_` prefix. `JINA_API_KEY` and `LANCEDB_PATH` are honoured as
//! fallbacks when the corresponding config keys are silent.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::EngramConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/engram/engram.toml` (system-wide)
/// 3. `~/.config/engram/engram.toml` (user XDG config)
/// 4. `./engram.toml` (local directory)
/// 5. `ENGRAM_*` environment variables
/// 6. `JINA_API_KEY` / `LANCEDB_PATH` fallbacks for still-unset keys
pub fn load_config() -> Result<EngramConfig, figment::Error> {
    let config: EngramConfig = Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file("/etc/engram/engram.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("engram/engram.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("engram.toml"))
        .merge(env_provider())
        .extract()?;
    Ok(apply_env_fallbacks(config))
}

/// Load configuration from TOML content only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<EngramConfig, figment::Error> {
    let config: EngramConfig = Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()?;
    Ok(apply_env_fallbacks(config))
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `ENGRAM_EMBEDDING_JINA_API_KEY` must
/// map to `embedding.jina_api_key`, not `embedding.jina.api.key`.
fn env_provider() -> Env {
    Env::prefixed("ENGRAM_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("engine_", "engine.", 1)
            .replacen("embedding_", "embedding.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("budget_", "budget.", 1)
            .replacen("decay_", "decay.", 1);
        mapped.into()
    })
}

/// Apply `JINA_API_KEY` / `LANCEDB_PATH` when config left the keys unset.
fn apply_env_fallbacks(mut config: EngramConfig) -> EngramConfig {
    if config.embedding.jina_api_key.is_none() {
        if let Ok(key) = std::env::var("JINA_API_KEY") {
            if !key.is_empty() {
                config.embedding.jina_api_key = Some(key);
            }
        }
    }
    if config.storage.db_path.is_none() {
        if let Ok(path) = std::env::var("LANCEDB_PATH") {
            if !path.is_empty() {
                config.storage.db_path = Some(path);
            }
        }
    }
    config
}
