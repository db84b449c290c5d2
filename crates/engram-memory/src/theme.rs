// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Theme manager: the top tier of the memory hierarchy.
//!
//! Assigns each fact to its nearest theme (or creates one), splits
//! overcrowded themes with two-means, merges small near-duplicate
//! neighbours, and maintains a k-NN graph over theme centroids. The
//! split and merge thresholds adapt to the observed distribution of
//! theme sizes and inter-theme similarities, falling back to fixed
//! bounds while observations are scarce.

use std::sync::Arc;
use std::sync::Mutex;

use engram_core::vector::{centroid, cosine_distance, cosine_similarity};
use engram_core::{EngramError, SummarizerAdapter, Table, VectorStoreAdapter};
use tracing::{debug, info};
use uuid::Uuid;

use crate::stats::TailSampler;
use crate::types::{Semantic, Theme};

/// Maximum cosine distance for joining an existing theme.
pub const ASSIGN_DISTANCE_THRESHOLD: f32 = 0.30;
/// Fixed split bound used while the size gate warms up.
pub const MAX_SEMANTICS_PER_THEME: usize = 12;
/// Themes smaller than this on both sides are merge candidates.
pub const MIN_SEMANTICS_PER_THEME: usize = 3;
/// Fixed merge similarity bound used while the merge gate warms up.
pub const MERGE_SIMILARITY_FALLBACK: f32 = 0.80;
/// Neighbours kept per theme in the k-NN graph.
pub const KNN_K: usize = 5;
/// A theme is dormant after this long without activity.
pub const DORMANT_AFTER_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Upper-tail fraction for both distribution gates.
const GATE_TAIL: f64 = 0.10;
/// Observations required before a gate replaces its fixed bound.
const GATE_MIN_OBSERVATIONS: usize = 10;
/// Theme name length cap.
const THEME_NAME_LIMIT: usize = 50;

impl Theme {
    /// Whether the theme has been inactive past the dormancy window.
    pub fn is_dormant(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.last_active) > DORMANT_AFTER_MS
    }
}

/// Maintains the theme tier: assignment, split, merge, and the k-NN graph.
pub struct ThemeManager {
    store: Arc<dyn VectorStoreAdapter>,
    max_themes: usize,
    /// Observed theme sizes at assignment time.
    size_gate: Mutex<TailSampler>,
    /// Observed inter-theme centroid similarities.
    merge_gate: Mutex<TailSampler>,
}

impl ThemeManager {
    pub fn new(store: Arc<dyn VectorStoreAdapter>, max_themes: usize) -> Self {
        Self {
            store,
            max_themes,
            size_gate: Mutex::new(TailSampler::new(GATE_MIN_OBSERVATIONS)),
            merge_gate: Mutex::new(TailSampler::new(GATE_MIN_OBSERVATIONS)),
        }
    }

    /// Assign a fact to a theme, persisting both sides of the pointer.
    ///
    /// Picks the theme with the highest centroid similarity; below the
    /// assignment threshold (or with no themes at all) a new theme is
    /// created with a summariser-generated name. After an assignment to
    /// an existing theme the split gate is consulted.
    ///
    /// Returns the id of the theme the fact now belongs to (the original
    /// theme id even when the assignment triggered a split).
    pub async fn assign(
        &self,
        fact: &mut Semantic,
        summarizer: &dyn SummarizerAdapter,
    ) -> Result<String, EngramError> {
        let now = chrono::Utc::now().timestamp_millis();
        let best = self
            .store
            .search(Table::Themes, &fact.embedding, 1)
            .await?
            .into_iter()
            .next();

        let theme_count = self.store.count_rows(Table::Themes).await?;
        let min_similarity = 1.0 - ASSIGN_DISTANCE_THRESHOLD;

        let theme_id = match best {
            Some(hit)
                if hit.similarity >= min_similarity
                    || theme_count >= self.max_themes =>
            {
                let mut theme = Theme::from_record(&hit.record);
                fact.theme_id = theme.id.clone();
                fact.updated_at = now;
                self.store.add(Table::Semantics, &fact.to_record()).await?;

                // Running-mean centroid update.
                let n = theme.semantic_ids.len() as f32;
                if theme.embedding.len() == fact.embedding.len() {
                    for (c, x) in theme.embedding.iter_mut().zip(fact.embedding.iter()) {
                        *c = (*c * n + x) / (n + 1.0);
                    }
                }
                theme.semantic_ids.push(fact.id.clone());
                theme.message_count += 1;
                theme.last_active = now;
                self.store.add(Table::Themes, &theme.to_record()).await?;

                let size = theme.semantic_ids.len();
                // Two-means needs at least two members to partition.
                if size > 1 && self.should_split(size) {
                    info!(theme_id = %theme.id, size, "splitting overcrowded theme");
                    self.split(theme, summarizer).await?;
                }
                fact.theme_id.clone()
            }
            _ => {
                let name = self.generate_name(&fact.content, summarizer).await?;
                let theme = Theme {
                    id: Uuid::new_v4().to_string(),
                    name,
                    summary: String::new(),
                    embedding: fact.embedding.clone(),
                    semantic_ids: vec![fact.id.clone()],
                    message_count: 1,
                    last_active: now,
                    neighbor_ids: vec![],
                };
                fact.theme_id = theme.id.clone();
                fact.updated_at = now;
                self.store.add(Table::Semantics, &fact.to_record()).await?;
                self.store.add(Table::Themes, &theme.to_record()).await?;
                debug!(theme_id = %theme.id, name = %theme.name, "created theme");
                theme.id
            }
        };
        Ok(theme_id)
    }

    /// Distribution-aware split gate: the size must sit in the upper
    /// ~10% tail of observed sizes, falling back to the fixed bound
    /// while fewer than ten observations are recorded.
    pub fn should_split(&self, size: usize) -> bool {
        let gate = self.size_gate.lock().unwrap();
        match gate.in_upper_tail(size as f64, GATE_TAIL) {
            Some(in_tail) => in_tail,
            None => size > MAX_SEMANTICS_PER_THEME,
        }
    }

    /// Merge gate: both themes must be under the minimum size, and their
    /// centroid similarity in the upper tail of observed inter-theme
    /// similarities (fixed fallback while warming up).
    pub fn should_merge(&self, size_a: usize, size_b: usize, similarity: f32) -> bool {
        if size_a >= MIN_SEMANTICS_PER_THEME || size_b >= MIN_SEMANTICS_PER_THEME {
            return false;
        }
        let gate = self.merge_gate.lock().unwrap();
        match gate.in_upper_tail(similarity as f64, GATE_TAIL) {
            Some(in_tail) => in_tail,
            None => similarity >= MERGE_SIMILARITY_FALLBACK,
        }
    }

    /// Split a theme in two with two-means over its fact embeddings.
    ///
    /// Three iterations, initialised with the first and last member;
    /// empty sides are repaired by moving one element over. The children
    /// get fresh names, group centroids, floor/ceiling message counts,
    /// and cleared neighbour lists; the parent is deleted.
    pub async fn split(
        &self,
        theme: Theme,
        summarizer: &dyn SummarizerAdapter,
    ) -> Result<(Theme, Theme), EngramError> {
        let mut members = Vec::new();
        for id in &theme.semantic_ids {
            if let Some(record) = self.store.get(Table::Semantics, id).await? {
                members.push(Semantic::from_record(&record));
            }
        }
        if members.len() < 2 {
            return Err(EngramError::Internal(format!(
                "cannot split theme {} with {} members",
                theme.id,
                members.len()
            )));
        }

        let embeddings: Vec<Vec<f32>> = members.iter().map(|m| m.embedding.clone()).collect();
        let (left_idx, right_idx) = two_means(&embeddings);

        let left: Vec<&Semantic> = left_idx.iter().map(|i| &members[*i]).collect();
        let right: Vec<&Semantic> = right_idx.iter().map(|i| &members[*i]).collect();

        let left_theme = self
            .build_split_child(&theme, &left, theme.message_count / 2, summarizer)
            .await?;
        let right_theme = self
            .build_split_child(
                &theme,
                &right,
                theme.message_count - theme.message_count / 2,
                summarizer,
            )
            .await?;

        // Persist children and reparent semantics before dropping the parent.
        self.store.add(Table::Themes, &left_theme.to_record()).await?;
        self.store.add(Table::Themes, &right_theme.to_record()).await?;
        self.reparent(&left, &left_theme.id).await?;
        self.reparent(&right, &right_theme.id).await?;
        self.store.delete(Table::Themes, &theme.id).await?;

        info!(
            parent = %theme.id,
            left = %left_theme.id,
            right = %right_theme.id,
            left_size = left_theme.semantic_ids.len(),
            right_size = right_theme.semantic_ids.len(),
            "theme split complete"
        );
        Ok((left_theme, right_theme))
    }

    async fn build_split_child(
        &self,
        parent: &Theme,
        members: &[&Semantic],
        message_count: u32,
        summarizer: &dyn SummarizerAdapter,
    ) -> Result<Theme, EngramError> {
        let embeddings: Vec<Vec<f32>> =
            members.iter().map(|m| m.embedding.clone()).collect();
        let seed = members
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_else(|| parent.name.clone());
        let name = self.generate_name(&seed, summarizer).await?;
        Ok(Theme {
            id: Uuid::new_v4().to_string(),
            name,
            summary: String::new(),
            embedding: centroid(&embeddings),
            semantic_ids: members.iter().map(|m| m.id.clone()).collect(),
            message_count,
            last_active: parent.last_active,
            neighbor_ids: vec![],
        })
    }

    async fn reparent(&self, members: &[&Semantic], theme_id: &str) -> Result<(), EngramError> {
        let now = chrono::Utc::now().timestamp_millis();
        for member in members {
            let mut fields = serde_json::Map::new();
            fields.insert("theme_id".into(), serde_json::json!(theme_id));
            fields.insert("updated_at".into(), serde_json::json!(now));
            self.store
                .update(Table::Semantics, &member.id, fields, None)
                .await?;
        }
        Ok(())
    }

    /// Merge small near-duplicate neighbours across the whole theme set.
    ///
    /// For each theme's k-NN neighbour where both sides are under the
    /// minimum size and the gate passes, the first theme absorbs the
    /// second: ids and name kept, semantic lists concatenated, counts
    /// summed, the first centroid retained (recomputed lazily by later
    /// assignments), `last_active` the max of the two.
    pub async fn merge_pass(&self) -> Result<usize, EngramError> {
        let records = self.store.scan_all(Table::Themes).await?;
        let mut themes: Vec<Theme> = records.iter().map(Theme::from_record).collect();
        let mut absorbed: Vec<String> = Vec::new();
        let mut merged = 0usize;

        for i in 0..themes.len() {
            if absorbed.contains(&themes[i].id) {
                continue;
            }
            let neighbor_ids = themes[i].neighbor_ids.clone();
            for neighbor_id in neighbor_ids {
                if absorbed.contains(&neighbor_id) || neighbor_id == themes[i].id {
                    continue;
                }
                let Some(j) = themes.iter().position(|t| t.id == neighbor_id) else {
                    continue;
                };
                let similarity =
                    cosine_similarity(&themes[i].embedding, &themes[j].embedding);
                if !self.should_merge(
                    themes[i].semantic_ids.len(),
                    themes[j].semantic_ids.len(),
                    similarity,
                ) {
                    continue;
                }

                let second = themes[j].clone();
                let first = &mut themes[i];
                first.semantic_ids.extend(second.semantic_ids.iter().cloned());
                first.message_count += second.message_count;
                first.last_active = first.last_active.max(second.last_active);

                let first_snapshot = first.clone();
                let member_refs: Vec<Semantic> = {
                    let mut list = Vec::new();
                    for id in &second.semantic_ids {
                        if let Some(record) = self.store.get(Table::Semantics, id).await? {
                            list.push(Semantic::from_record(&record));
                        }
                    }
                    list
                };
                let refs: Vec<&Semantic> = member_refs.iter().collect();
                self.reparent(&refs, &first_snapshot.id).await?;
                self.store.add(Table::Themes, &first_snapshot.to_record()).await?;
                self.store.delete(Table::Themes, &second.id).await?;
                absorbed.push(second.id.clone());
                merged += 1;
                info!(kept = %first_snapshot.id, absorbed = %second.id, "merged themes");
            }
        }
        Ok(merged)
    }

    /// Recompute each theme's top-K neighbours by centroid similarity.
    ///
    /// Neighbour lists are descending, self-free, and at most K long.
    /// The pass doubles as the sampling point for both distribution
    /// gates: it records every theme's current size and the observed
    /// pairwise similarities.
    pub async fn rebuild_knn(&self) -> Result<(), EngramError> {
        let records = self.store.scan_all(Table::Themes).await?;
        let themes: Vec<Theme> = records.iter().map(Theme::from_record).collect();

        {
            let mut gate = self.size_gate.lock().unwrap();
            for theme in &themes {
                gate.record(theme.semantic_ids.len() as f64);
            }
        }

        for theme in &themes {
            let mut scored: Vec<(String, f32)> = themes
                .iter()
                .filter(|other| other.id != theme.id)
                .map(|other| {
                    (
                        other.id.clone(),
                        cosine_similarity(&theme.embedding, &other.embedding),
                    )
                })
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(KNN_K);

            {
                let mut gate = self.merge_gate.lock().unwrap();
                for (_, sim) in &scored {
                    gate.record(*sim as f64);
                }
            }

            let neighbor_ids: Vec<String> = scored.into_iter().map(|(id, _)| id).collect();
            let mut fields = serde_json::Map::new();
            fields.insert(
                "neighbor_ids".into(),
                engram_core::types::list_to_field(&neighbor_ids),
            );
            self.store
                .update(Table::Themes, &theme.id, fields, None)
                .await?;
        }
        Ok(())
    }

    /// Sparsity score: `N² / (K · Σ n_k² + ε)`. High means facts spread
    /// evenly across themes.
    pub async fn sparsity(&self) -> Result<f64, EngramError> {
        let records = self.store.scan_all(Table::Themes).await?;
        let sizes: Vec<f64> = records
            .iter()
            .map(|r| Theme::from_record(r).semantic_ids.len() as f64)
            .collect();
        let n: f64 = sizes.iter().sum();
        let k = sizes.len() as f64;
        let sum_sq: f64 = sizes.iter().map(|s| s * s).sum();
        Ok((n * n) / (k * sum_sq + f64::EPSILON))
    }

    async fn generate_name(
        &self,
        seed: &str,
        summarizer: &dyn SummarizerAdapter,
    ) -> Result<String, EngramError> {
        let prompt = format!(
            "Give a short topic name (at most 50 characters, no quotes) for \
             a memory theme seeded by this fact. Answer with the name only, \
             in the language of the input.\n\nFact: {seed}"
        );
        let name = summarizer.complete(&prompt, 32).await?;
        let name: String = name.trim().chars().take(THEME_NAME_LIMIT).collect();
        if name.is_empty() {
            return Ok("untitled".to_string());
        }
        Ok(name)
    }
}

/// Two-means clustering over fact embeddings.
///
/// Three iterations, centroids initialised with the first and last
/// member. Returns the member indices of each side; neither side is
/// empty (one element is moved over if needed).
pub fn two_means(embeddings: &[Vec<f32>]) -> (Vec<usize>, Vec<usize>) {
    assert!(embeddings.len() >= 2, "two_means needs at least two points");
    let mut center_a = embeddings[0].clone();
    let mut center_b = embeddings[embeddings.len() - 1].clone();

    let mut left: Vec<usize> = Vec::new();
    let mut right: Vec<usize> = Vec::new();

    for _ in 0..3 {
        left.clear();
        right.clear();
        for (i, e) in embeddings.iter().enumerate() {
            if cosine_distance(e, &center_a) <= cosine_distance(e, &center_b) {
                left.push(i);
            } else {
                right.push(i);
            }
        }
        if !left.is_empty() {
            center_a = centroid(&left.iter().map(|i| embeddings[*i].clone()).collect::<Vec<_>>());
        }
        if !right.is_empty() {
            center_b = centroid(&right.iter().map(|i| embeddings[*i].clone()).collect::<Vec<_>>());
        }
    }

    // Enforce non-empty groups.
    if left.is_empty() {
        left.push(right.pop().expect("right side cannot also be empty"));
    } else if right.is_empty() {
        right.push(left.pop().expect("left side cannot also be empty"));
    }
    (left, right)
}
