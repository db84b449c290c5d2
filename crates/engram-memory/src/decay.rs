// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weekly decay sweep and near-duplicate elimination.
//!
//! Policy: themes never decay; semantics and episodes are deleted three
//! half-lives after creation; episode raw-message blobs are blanked after
//! the retention window. The sweep walks `scan_all`, never a bounded
//! vector search. `decay_weight` also down-weights retrieval candidates.

use std::sync::Arc;

use engram_config::DecayConfig;
use engram_core::vector::cosine_distance;
use engram_core::{EngramError, Table, VectorStoreAdapter};
use tracing::info;

use crate::types::{Episode, Semantic, Theme};

const DAY_MS: f64 = 86_400_000.0;

/// Records older than this many half-lives are deleted.
const DELETE_AFTER_HALF_LIVES: f64 = 3.0;

/// Steady-state intra-theme duplicate distance.
const DEDUP_DISTANCE: f32 = 0.10;

/// Neighbours consulted per semantic during the dedup sweep.
const DEDUP_KNN: usize = 5;

/// `0.5^(age / half_life)`, or 1.0 for never-decaying records.
pub fn decay_weight(created_at: i64, now: i64, half_life_days: Option<f64>) -> f64 {
    let Some(half_life) = half_life_days else {
        return 1.0;
    };
    if half_life <= 0.0 {
        return 1.0;
    }
    let age_days = (now - created_at).max(0) as f64 / DAY_MS;
    0.5f64.powf(age_days / half_life)
}

/// Counters from one decay sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecaySweepReport {
    pub episodes_deleted: usize,
    pub semantics_deleted: usize,
    pub blobs_blanked: usize,
    pub duplicates_removed: usize,
}

/// Runs the weekly maintenance sweeps against the store.
pub struct DecayManager {
    store: Arc<dyn VectorStoreAdapter>,
    config: DecayConfig,
}

impl DecayManager {
    pub fn new(store: Arc<dyn VectorStoreAdapter>, config: DecayConfig) -> Self {
        Self { store, config }
    }

    /// Full decay sweep: blank old raw blobs, delete expired episodes and
    /// semantics, keep theme lists consistent.
    pub async fn sweep(&self, now: i64) -> Result<DecaySweepReport, EngramError> {
        let mut report = DecaySweepReport::default();

        let episode_cutoff =
            (self.config.episode_half_life_days * DELETE_AFTER_HALF_LIVES * DAY_MS) as i64;
        let blob_cutoff = (self.config.message_retain_days * DAY_MS) as i64;

        for record in self.store.scan_all(Table::Episodes).await? {
            let episode = Episode::from_record(&record);
            let age = now - episode.created_at;
            if age > episode_cutoff {
                self.store.delete(Table::Episodes, &episode.id).await?;
                report.episodes_deleted += 1;
            } else if age > blob_cutoff && episode.raw_messages != "[]" {
                let mut fields = serde_json::Map::new();
                // Empty-array sentinel keeps the column parseable.
                fields.insert("raw_messages".into(), serde_json::json!("[]"));
                self.store
                    .update(Table::Episodes, &episode.id, fields, None)
                    .await?;
                report.blobs_blanked += 1;
            }
        }

        let semantic_cutoff =
            (self.config.semantic_half_life_days * DELETE_AFTER_HALF_LIVES * DAY_MS) as i64;
        for record in self.store.scan_all(Table::Semantics).await? {
            let semantic = Semantic::from_record(&record);
            if now - semantic.created_at > semantic_cutoff {
                self.remove_semantic(&semantic).await?;
                report.semantics_deleted += 1;
            }
        }

        info!(
            episodes_deleted = report.episodes_deleted,
            semantics_deleted = report.semantics_deleted,
            blobs_blanked = report.blobs_blanked,
            "decay sweep complete"
        );
        Ok(report)
    }

    /// Near-duplicate elimination over semantics.
    ///
    /// Each fact asks the store for its nearest neighbours and drops the
    /// younger of any pair closer than the steady-state distance. This
    /// keeps the pass at one vector search per fact instead of comparing
    /// every pair.
    pub async fn dedup_sweep(&self) -> Result<usize, EngramError> {
        let records = self.store.scan_all(Table::Semantics).await?;
        let mut removed_ids: Vec<String> = Vec::new();
        let mut removed = 0usize;

        for record in &records {
            if removed_ids.contains(&record.id) {
                continue;
            }
            let semantic = Semantic::from_record(record);
            let neighbors = self
                .store
                .search(Table::Semantics, &semantic.embedding, DEDUP_KNN)
                .await?;
            for hit in neighbors {
                if hit.record.id == semantic.id || removed_ids.contains(&hit.record.id) {
                    continue;
                }
                if cosine_distance(&semantic.embedding, &hit.record.vector) < DEDUP_DISTANCE {
                    let other = Semantic::from_record(&hit.record);
                    // Keep the older record.
                    let victim = if other.created_at >= semantic.created_at {
                        other
                    } else {
                        semantic.clone()
                    };
                    self.remove_semantic(&victim).await?;
                    removed_ids.push(victim.id.clone());
                    removed += 1;
                    if victim.id == semantic.id {
                        break;
                    }
                }
            }
        }

        if removed > 0 {
            info!(removed, "dedup sweep removed near-duplicate semantics");
        }
        Ok(removed)
    }

    /// Delete a semantic and drop it from its owning theme's list.
    async fn remove_semantic(&self, semantic: &Semantic) -> Result<(), EngramError> {
        self.store.delete(Table::Semantics, &semantic.id).await?;
        if semantic.theme_id.is_empty() {
            return Ok(());
        }
        if let Some(record) = self.store.get(Table::Themes, &semantic.theme_id).await? {
            let mut theme = Theme::from_record(&record);
            theme.semantic_ids.retain(|id| id != &semantic.id);
            let mut fields = serde_json::Map::new();
            fields.insert(
                "semantic_ids".into(),
                engram_core::types::list_to_field(&theme.semantic_ids),
            );
            self.store
                .update(Table::Themes, &theme.id, fields, None)
                .await?;
        }
        Ok(())
    }
}
