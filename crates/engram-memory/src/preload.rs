// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Predictive preloader: learns which themes recur in which weekly time
//! slots and exposes them as preload hints.

use std::collections::HashMap;

use tracing::debug;

const DAY_MS: i64 = 86_400_000;
const HOUR_MS: i64 = 3_600_000;

/// Minimum sightings of a bucket before it produces a rule.
const MIN_OBSERVATIONS: usize = 3;
/// Themes kept per bucket.
const THEMES_PER_BUCKET: usize = 2;

/// One learned preload rule: in this weekly slot, these themes recur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadRule {
    /// Day of week, 0 = Monday.
    pub weekday: u8,
    /// Three-hour bucket, 0..8.
    pub hour_bucket: u8,
    /// Top theme ids for the slot, most frequent first.
    pub theme_ids: Vec<String>,
}

/// `(weekday, 3-hour bucket)` for a timestamp.
pub fn time_slot(timestamp_ms: i64) -> (u8, u8) {
    let days = timestamp_ms.div_euclid(DAY_MS);
    let weekday = ((days + 3).rem_euclid(7)) as u8; // epoch day 0 was a Thursday
    let hour = (timestamp_ms.rem_euclid(DAY_MS) / HOUR_MS) as u8;
    (weekday, hour / 3)
}

/// Build preload rules from `(episode created_at, theme id)` observations.
///
/// Buckets observed at least three times keep their top two themes.
pub fn build_preload_rules(observations: &[(i64, String)]) -> Vec<PreloadRule> {
    let mut buckets: HashMap<(u8, u8), Vec<String>> = HashMap::new();
    for (timestamp, theme_id) in observations {
        buckets
            .entry(time_slot(*timestamp))
            .or_default()
            .push(theme_id.clone());
    }

    let mut rules: Vec<PreloadRule> = buckets
        .into_iter()
        .filter(|(_, themes)| themes.len() >= MIN_OBSERVATIONS)
        .map(|((weekday, hour_bucket), themes)| {
            let mut counts: HashMap<&String, usize> = HashMap::new();
            for theme in &themes {
                *counts.entry(theme).or_insert(0) += 1;
            }
            let mut ranked: Vec<(&String, usize)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            PreloadRule {
                weekday,
                hour_bucket,
                theme_ids: ranked
                    .into_iter()
                    .take(THEMES_PER_BUCKET)
                    .map(|(id, _)| id.clone())
                    .collect(),
            }
        })
        .collect();
    rules.sort_by_key(|r| (r.weekday, r.hour_bucket));
    debug!(rules = rules.len(), "preload rules rebuilt");
    rules
}

/// The rule matching `now`, if any.
pub fn preload_hint<'a>(rules: &'a [PreloadRule], now_ms: i64) -> Option<&'a PreloadRule> {
    let (weekday, hour_bucket) = time_slot(now_ms);
    rules
        .iter()
        .find(|r| r.weekday == weekday && r.hour_bucket == hour_bucket)
}
