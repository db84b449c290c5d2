// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weekly user-profile rebuild: one phase row per ISO week, with older
//! phases merged into a rolling global summary.

use std::sync::Arc;

use chrono::Datelike;
use engram_core::vector::centroid;
use engram_core::{EngramError, SummarizerAdapter, Table, VectorStoreAdapter};
use tracing::info;

use crate::types::{Episode, UserProfile};

/// Global summary length cap in characters.
const GLOBAL_SUMMARY_LIMIT: usize = 2000;

/// ISO-week phase label for a timestamp, e.g. `2026-W29`.
pub fn phase_label(timestamp_ms: i64) -> String {
    let dt = chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .unwrap_or_else(|| chrono::DateTime::from_timestamp_millis(0).unwrap());
    let week = dt.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Rebuilds user profiles from the current week's episodes.
pub struct ProfileBuilder {
    store: Arc<dyn VectorStoreAdapter>,
}

impl ProfileBuilder {
    pub fn new(store: Arc<dyn VectorStoreAdapter>) -> Self {
        Self { store }
    }

    /// Build (or replace) the current phase profile for a user.
    ///
    /// The summarizer produces two short paragraphs (behavioural, then
    /// cognitive) from the week's episode summaries. Any older phase rows
    /// are folded into the new row's global summary and deleted, keeping
    /// one latest row per (user, phase).
    pub async fn rebuild_weekly(
        &self,
        user_id: &str,
        episodes: &[Episode],
        summarizer: &dyn SummarizerAdapter,
        now_ms: i64,
    ) -> Result<Option<UserProfile>, EngramError> {
        if episodes.is_empty() {
            return Ok(None);
        }
        let phase = phase_label(now_ms);

        let summaries: String = episodes
            .iter()
            .map(|e| format!("- {}", e.summary))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "From these episode summaries of one user's week, write two short \
             paragraphs separated by a blank line. First paragraph: the \
             user's behavioural patterns. Second paragraph: their cognitive \
             preferences (how they like information presented). Answer in \
             the language of the input.\n\n{summaries}"
        );
        let response = summarizer.complete(&prompt, 512).await?;
        let (behavioral, cognitive) = split_paragraphs(&response);

        // Fold older phases into the global text, newest first.
        let existing = self
            .store
            .filter_eq(Table::UserProfile, "user_id", &serde_json::json!(user_id))
            .await?;
        let mut global_parts: Vec<String> = Vec::new();
        for record in &existing {
            let old = UserProfile::from_record(record);
            if old.phase == phase {
                continue;
            }
            if !old.global_summary.is_empty() {
                global_parts.push(old.global_summary.clone());
            }
            if !old.behavioral.is_empty() {
                global_parts.push(format!("[{}] {}", old.phase, old.behavioral));
            }
            self.store.delete(Table::UserProfile, &old.id).await?;
        }
        let global_summary: String = global_parts
            .join(" ")
            .chars()
            .take(GLOBAL_SUMMARY_LIMIT)
            .collect();

        let embeddings: Vec<Vec<f32>> = episodes.iter().map(|e| e.embedding.clone()).collect();
        let profile = UserProfile {
            id: format!("{user_id}:{phase}"),
            user_id: user_id.to_string(),
            phase,
            behavioral,
            cognitive,
            global_summary,
            embedding: centroid(&embeddings),
            updated_at: now_ms,
        };
        self.store
            .add(Table::UserProfile, &profile.to_record())
            .await?;
        info!(user_id, phase = %profile.phase, "user profile rebuilt");
        Ok(Some(profile))
    }

    /// Latest profile row for a user, preferring the current phase.
    pub async fn latest(
        &self,
        user_id: &str,
        now_ms: i64,
    ) -> Result<Option<UserProfile>, EngramError> {
        let phase = phase_label(now_ms);
        let id = format!("{user_id}:{phase}");
        if let Some(record) = self.store.get(Table::UserProfile, &id).await? {
            return Ok(Some(UserProfile::from_record(&record)));
        }
        let mut rows: Vec<UserProfile> = self
            .store
            .filter_eq(Table::UserProfile, "user_id", &serde_json::json!(user_id))
            .await?
            .iter()
            .map(UserProfile::from_record)
            .collect();
        rows.sort_by_key(|p| std::cmp::Reverse(p.updated_at));
        Ok(rows.into_iter().next())
    }
}

fn split_paragraphs(text: &str) -> (String, String) {
    let mut parts = text.splitn(2, "\n\n");
    let first = parts.next().unwrap_or_default().trim().to_string();
    let second = parts.next().unwrap_or_default().trim().to_string();
    (first, second)
}
