// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temporal-semantic overlay: "last week" means the week the event
//! happened, not when it was discussed.
//!
//! Holds the relative-expression parser, semantic-time extraction
//! (heuristic first, LLM fallback), the durative-memory builder, and the
//! temporal reranker used on retrieval candidates.

use std::collections::VecDeque;

use engram_core::vector::{centroid, cosine_similarity};
use engram_core::SummarizerAdapter;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

use crate::types::{DurativeMemory, Episode, TemporalEvent};

const DAY_MS: i64 = 86_400_000;

/// Capacity of the in-memory temporal event ring.
pub const TEMPORAL_RING_CAPACITY: usize = 200;

/// Maximum gap between grouped events, in days.
const MAX_GAP_DAYS: i64 = 3;
/// Minimum embedding similarity to the group seed.
const GROUP_SIMILARITY_THRESHOLD: f32 = 0.6;
/// Reranker score floor.
const RERANK_FLOOR: f64 = 0.1;

/// A parsed temporal query intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalIntent {
    pub is_temporal: bool,
    /// Range start, ms since epoch. Meaningless when not temporal.
    pub start: i64,
    /// Range end; always `>= start`.
    pub end: i64,
}

impl TemporalIntent {
    fn none() -> Self {
        Self {
            is_temporal: false,
            start: 0,
            end: 0,
        }
    }
}

/// UTC midnight of the day containing `ms`.
fn midnight(ms: i64) -> i64 {
    ms - ms.rem_euclid(DAY_MS)
}

fn days_ago_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| Regex::new(r"(\d+)\s*(?:days?\s*ago|天前)").unwrap())
}

/// Map relative time expressions in a query to a concrete (start, end)
/// range around `now_ms`. Non-matching queries return `is_temporal = false`.
pub fn parse_temporal_intent(query: &str, now_ms: i64) -> TemporalIntent {
    let lowered = query.to_lowercase();
    let today = midnight(now_ms);

    if let Some(caps) = days_ago_pattern().captures(&lowered) {
        if let Ok(n) = caps[1].parse::<i64>() {
            let day = midnight(now_ms - n * DAY_MS);
            return TemporalIntent {
                is_temporal: true,
                start: day,
                end: day + DAY_MS,
            };
        }
    }
    if lowered.contains("yesterday") || lowered.contains("昨天") {
        return TemporalIntent {
            is_temporal: true,
            start: today - DAY_MS,
            end: today,
        };
    }
    if lowered.contains("today") || lowered.contains("今天") {
        return TemporalIntent {
            is_temporal: true,
            start: today,
            end: now_ms,
        };
    }
    if lowered.contains("last week") || lowered.contains("上周") {
        // Previous calendar week, Monday-based.
        let week_start = today - weekday_offset(now_ms) * DAY_MS;
        return TemporalIntent {
            is_temporal: true,
            start: week_start - 7 * DAY_MS,
            end: week_start,
        };
    }
    if lowered.contains("this week") || lowered.contains("本周") {
        // Resolved to the midnight of the week's first day, not a raw
        // day-of-week subtraction from the current instant.
        let week_start = today - weekday_offset(now_ms) * DAY_MS;
        return TemporalIntent {
            is_temporal: true,
            start: week_start,
            end: now_ms,
        };
    }
    if lowered.contains("recently") || lowered.contains("最近") {
        return TemporalIntent {
            is_temporal: true,
            start: now_ms - 7 * DAY_MS,
            end: now_ms,
        };
    }
    TemporalIntent::none()
}

/// Days since Monday for the day containing `ms` (epoch day 0 was a
/// Thursday).
fn weekday_offset(ms: i64) -> i64 {
    let days = ms.div_euclid(DAY_MS);
    (days + 3).rem_euclid(7)
}

fn iso_date_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap())
}

fn cjk_date_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日").unwrap())
}

fn date_to_ms(year: i32, month: u32, day: u32) -> Option<i64> {
    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Heuristic semantic-time extraction: absolute dates first, then common
/// relative markers, else the dialogue time with zero duration.
///
/// Returns `(semantic_time_ms, duration_ms)`.
pub fn extract_semantic_time(text: &str, dialogue_time: i64) -> (i64, i64) {
    for pattern in [iso_date_pattern(), cjk_date_pattern()] {
        if let Some(caps) = pattern.captures(text) {
            let parsed = (
                caps[1].parse::<i32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<u32>(),
            );
            if let (Ok(y), Ok(m), Ok(d)) = parsed {
                if let Some(ms) = date_to_ms(y, m, d) {
                    return (ms, 0);
                }
            }
        }
    }
    let lowered = text.to_lowercase();
    if lowered.contains("yesterday") || lowered.contains("昨天") {
        return (dialogue_time - DAY_MS, 0);
    }
    if lowered.contains("last week") || lowered.contains("上周") {
        return (dialogue_time - 7 * DAY_MS, 7 * DAY_MS);
    }
    (dialogue_time, 0)
}

/// LLM-based semantic-time extraction, used as a fallback when callers
/// want more than the heuristic offers.
///
/// The model must answer `{"date":"YYYY-MM-DD","duration_days":N}`;
/// anything else falls through to `None` and the heuristic result stands.
pub async fn extract_semantic_time_llm(
    summarizer: &dyn SummarizerAdapter,
    text: &str,
    dialogue_time: i64,
) -> Option<(i64, i64)> {
    let dialogue_date = chrono::DateTime::from_timestamp_millis(dialogue_time)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let prompt = format!(
        "When did the event described below happen? Today is {dialogue_date}. \
         Answer with JSON only: {{\"date\":\"YYYY-MM-DD\",\"duration_days\":N}}\n\n{text}"
    );
    let response = summarizer.complete(&prompt, 64).await.ok()?;

    let start = response.find('{')?;
    let end = response.rfind('}')? + 1;
    let value: serde_json::Value = serde_json::from_str(&response[start..end]).ok()?;
    let date = value.get("date")?.as_str()?;
    let duration_days = value.get("duration_days").and_then(|d| d.as_i64()).unwrap_or(0);

    let caps = iso_date_pattern().captures(date)?;
    let ms = date_to_ms(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    Some((ms, duration_days.max(0) * DAY_MS))
}

/// Bounded in-memory ring of temporal events, newest last.
#[derive(Debug, Default)]
pub struct TemporalEventRing {
    events: VecDeque<TemporalEvent>,
}

impl TemporalEventRing {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: TemporalEvent) {
        if self.events.len() >= TEMPORAL_RING_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn snapshot(&self) -> Vec<TemporalEvent> {
        self.events.iter().cloned().collect()
    }
}

/// Group temporally-continuous related events into durative memories.
///
/// Events are sorted by semantic time; a group grows while the next event
/// starts within the gap of the running group end and resembles the seed.
/// A group is emitted when it has more than one member or its seed alone
/// spans a non-zero duration.
pub fn build_durative_memories(events: &[TemporalEvent]) -> Vec<DurativeMemory> {
    let mut sorted: Vec<&TemporalEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.semantic_time);

    let mut memories = Vec::new();
    let mut group: Vec<&TemporalEvent> = Vec::new();
    let mut group_end = 0i64;

    let flush = |group: &mut Vec<&TemporalEvent>, group_end: i64, out: &mut Vec<DurativeMemory>| {
        if let Some(seed) = group.first() {
            if group.len() > 1 || seed.duration_ms > 0 {
                out.push(durative_from_group(group, group_end));
            }
        }
        group.clear();
    };

    for event in sorted {
        match group.first() {
            None => {
                group_end = event.semantic_time + event.duration_ms;
                group.push(event);
            }
            Some(seed) => {
                let within_gap = event.semantic_time <= group_end + MAX_GAP_DAYS * DAY_MS;
                let similar = cosine_similarity(&seed.embedding, &event.embedding)
                    >= GROUP_SIMILARITY_THRESHOLD;
                if within_gap && similar {
                    group_end = group_end.max(event.semantic_time + event.duration_ms);
                    group.push(event);
                } else {
                    flush(&mut group, group_end, &mut memories);
                    group_end = event.semantic_time + event.duration_ms;
                    group.push(event);
                }
            }
        }
    }
    flush(&mut group, group_end, &mut memories);
    debug!(events = events.len(), durative = memories.len(), "durative rebuild");
    memories
}

fn durative_from_group(group: &[&TemporalEvent], group_end: i64) -> DurativeMemory {
    let seed = group[0];
    let summary: String = group
        .iter()
        .take(2)
        .map(|e| e.content.chars().take(120).collect::<String>())
        .collect::<Vec<_>>()
        .join("; ");
    let embeddings: Vec<Vec<f32>> = group.iter().map(|e| e.embedding.clone()).collect();
    DurativeMemory {
        id: Uuid::new_v4().to_string(),
        summary,
        start_time: seed.semantic_time,
        end_time: group_end,
        event_ids: group.iter().map(|e| e.id.clone()).collect(),
        theme_tag: String::new(),
        embedding: centroid(&embeddings),
    }
}

/// Rerank retrieval candidates for a temporal query.
///
/// An episode whose associated event falls in the range scores 1.0;
/// otherwise it scores by linear proximity to the range centre. Scores
/// below the floor drop out. Without any temporal events, falls back to
/// filtering on `created_at`.
pub fn rerank_episodes(
    episodes: Vec<Episode>,
    events: &[TemporalEvent],
    intent: &TemporalIntent,
) -> Vec<Episode> {
    if !intent.is_temporal {
        return episodes;
    }
    if events.is_empty() {
        return episodes
            .into_iter()
            .filter(|e| e.created_at >= intent.start && e.created_at <= intent.end)
            .collect();
    }

    let centre = (intent.start + intent.end) / 2;
    let scale = (intent.end - intent.start).max(DAY_MS);

    let mut scored: Vec<(Episode, f64)> = episodes
        .into_iter()
        .filter_map(|episode| {
            let episode_events: Vec<&TemporalEvent> = events
                .iter()
                .filter(|e| e.episode_id == episode.id)
                .collect();
            let score = if episode_events.is_empty() {
                proximity_score(episode.created_at, centre, scale)
            } else if episode_events.iter().any(|e| {
                let end = e.semantic_time + e.duration_ms;
                e.semantic_time <= intent.end && end >= intent.start
            }) {
                1.0
            } else {
                episode_events
                    .iter()
                    .map(|e| proximity_score(e.semantic_time, centre, scale))
                    .fold(0.0f64, f64::max)
            };
            if score < RERANK_FLOOR {
                None
            } else {
                Some((episode, score))
            }
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(e, _)| e).collect()
}

/// Linear falloff from the range centre over five range widths.
fn proximity_score(t: i64, centre: i64, scale: i64) -> f64 {
    let dist = (t - centre).abs() as f64;
    (1.0 - dist / (5.0 * scale as f64)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-07-15 12:00:00 UTC, a Wednesday.
    const NOW: i64 = 1_784_116_800_000;

    fn event(id: &str, semantic_time: i64, duration_ms: i64, embedding: Vec<f32>) -> TemporalEvent {
        TemporalEvent {
            id: id.into(),
            content: format!("event {id}"),
            semantic_time,
            dialogue_time: NOW,
            duration_ms,
            episode_id: id.into(),
            embedding,
        }
    }

    fn episode(id: &str, created_at: i64) -> Episode {
        Episode {
            id: id.into(),
            summary: format!("episode {id}"),
            session_id: "s1".into(),
            turn_start: 0,
            turn_end: 4,
            message_count: 5,
            created_at,
            embedding: vec![1.0],
            raw_messages: "[]".into(),
        }
    }

    #[test]
    fn non_temporal_query() {
        let intent = parse_temporal_intent("how does the parser work", NOW);
        assert!(!intent.is_temporal);
    }

    #[test]
    fn yesterday_range() {
        let intent = parse_temporal_intent("what did we discuss yesterday", NOW);
        assert!(intent.is_temporal);
        assert_eq!(intent.end, midnight(NOW));
        assert_eq!(intent.start, midnight(NOW) - DAY_MS);
    }

    #[test]
    fn chinese_markers() {
        for query in ["昨天聊了什么", "上周的会议", "最近做了什么", "3天前的讨论"] {
            let intent = parse_temporal_intent(query, NOW);
            assert!(intent.is_temporal, "{query} should be temporal");
            assert!(intent.end >= intent.start);
        }
    }

    #[test]
    fn n_days_ago_is_a_day_span() {
        let intent = parse_temporal_intent("what happened 3 days ago", NOW);
        assert!(intent.is_temporal);
        assert_eq!(intent.start, midnight(NOW - 3 * DAY_MS));
        assert_eq!(intent.end - intent.start, DAY_MS);
    }

    #[test]
    fn this_week_starts_at_midnight() {
        let intent = parse_temporal_intent("summarize this week", NOW);
        assert!(intent.is_temporal);
        // Wednesday: week started two days back, at midnight exactly.
        assert_eq!(intent.start, midnight(NOW) - 2 * DAY_MS);
        assert_eq!(intent.start % DAY_MS, 0, "start must be zeroed to midnight");
        assert_eq!(intent.end, NOW);
    }

    #[test]
    fn last_week_precedes_this_week() {
        let this_week = parse_temporal_intent("this week", NOW);
        let last_week = parse_temporal_intent("last week", NOW);
        assert_eq!(last_week.end, this_week.start);
        assert_eq!(last_week.end - last_week.start, 7 * DAY_MS);
    }

    #[test]
    fn every_temporal_intent_is_ordered() {
        for query in [
            "yesterday", "today", "last week", "this week", "recently",
            "5 days ago", "昨天", "上周", "本周", "最近", "2天前",
        ] {
            let intent = parse_temporal_intent(query, NOW);
            assert!(intent.is_temporal);
            assert!(intent.end >= intent.start, "{query}: end < start");
        }
    }

    #[test]
    fn semantic_time_iso_date() {
        let (t, d) = extract_semantic_time("the launch was on 2026-07-01", NOW);
        assert_eq!(t, date_to_ms(2026, 7, 1).unwrap());
        assert_eq!(d, 0);
    }

    #[test]
    fn semantic_time_chinese_date() {
        let (t, d) = extract_semantic_time("发布是在2026年7月1日", NOW);
        assert_eq!(t, date_to_ms(2026, 7, 1).unwrap());
        assert_eq!(d, 0);
    }

    #[test]
    fn semantic_time_yesterday() {
        let (t, d) = extract_semantic_time("we shipped it yesterday", NOW);
        assert_eq!(t, NOW - DAY_MS);
        assert_eq!(d, 0);
    }

    #[test]
    fn semantic_time_last_week_has_duration() {
        let (t, d) = extract_semantic_time("the sprint 上周 wrapped up", NOW);
        assert_eq!(t, NOW - 7 * DAY_MS);
        assert_eq!(d, 7 * DAY_MS);
    }

    #[test]
    fn semantic_time_defaults_to_dialogue_time() {
        let (t, d) = extract_semantic_time("we talked about parsing", NOW);
        assert_eq!(t, NOW);
        assert_eq!(d, 0);
    }

    #[test]
    fn ring_bounded_at_capacity() {
        let mut ring = TemporalEventRing::new();
        for i in 0..(TEMPORAL_RING_CAPACITY + 20) {
            ring.push(event(&format!("e{i}"), NOW + i as i64, 0, vec![1.0]));
        }
        assert_eq!(ring.len(), TEMPORAL_RING_CAPACITY);
        // Oldest entries were evicted.
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.first().unwrap().id, "e20");
    }

    #[test]
    fn durative_groups_close_similar_events() {
        let events = vec![
            event("a", NOW, 0, vec![1.0, 0.0]),
            event("b", NOW + DAY_MS, 0, vec![0.95, 0.05]),
            event("c", NOW + 2 * DAY_MS, 0, vec![0.9, 0.1]),
        ];
        let memories = build_durative_memories(&events);
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].event_ids.len(), 3);
        assert_eq!(memories[0].start_time, NOW);
        assert!(memories[0].end_time >= NOW + 2 * DAY_MS);
    }

    #[test]
    fn durative_gap_breaks_group() {
        let events = vec![
            event("a", NOW, 0, vec![1.0, 0.0]),
            event("b", NOW + DAY_MS, 0, vec![1.0, 0.0]),
            // Ten days later: over the gap.
            event("c", NOW + 11 * DAY_MS, 0, vec![1.0, 0.0]),
        ];
        let memories = build_durative_memories(&events);
        // Only the first pair forms a durative memory; the stranded point
        // event has zero duration and is not emitted.
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].event_ids, vec!["a", "b"]);
    }

    #[test]
    fn durative_dissimilar_events_not_grouped() {
        let events = vec![
            event("a", NOW, 0, vec![1.0, 0.0]),
            event("b", NOW + DAY_MS, 0, vec![0.0, 1.0]),
        ];
        let memories = build_durative_memories(&events);
        assert!(memories.is_empty());
    }

    #[test]
    fn durative_single_event_with_duration_emitted() {
        let events = vec![event("a", NOW, 7 * DAY_MS, vec![1.0])];
        let memories = build_durative_memories(&events);
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].end_time, NOW + 7 * DAY_MS);
    }

    #[test]
    fn rerank_keeps_only_in_range_episode() {
        let intent = parse_temporal_intent("what did we discuss yesterday", NOW);
        let old = episode("old", NOW - 10 * DAY_MS);
        let recent = episode("recent", midnight(NOW) - DAY_MS / 2);
        let events = vec![
            event("old", NOW - 10 * DAY_MS, 0, vec![1.0]),
            event("recent", midnight(NOW) - DAY_MS / 2, 0, vec![1.0]),
        ];
        let ranked = rerank_episodes(vec![old, recent], &events, &intent);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "recent");
    }

    #[test]
    fn rerank_without_events_filters_on_created_at() {
        let intent = parse_temporal_intent("yesterday", NOW);
        let old = episode("old", NOW - 10 * DAY_MS);
        let recent = episode("recent", midnight(NOW) - DAY_MS / 2);
        let ranked = rerank_episodes(vec![old, recent], &[], &intent);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "recent");
    }

    #[test]
    fn rerank_non_temporal_is_identity() {
        let intent = parse_temporal_intent("how do lifetimes work", NOW);
        let episodes = vec![episode("a", NOW), episode("b", NOW - DAY_MS)];
        let ranked = rerank_episodes(episodes.clone(), &[], &intent);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "a");
    }

    #[tokio::test]
    async fn llm_extraction_parses_valid_json() {
        let summarizer = engram_test_utils::MockSummarizer::new();
        summarizer.push_response(r#"{"date":"2026-06-30","duration_days":2}"#);
        let result = extract_semantic_time_llm(&summarizer, "the offsite", NOW).await;
        let (t, d) = result.unwrap();
        assert_eq!(t, date_to_ms(2026, 6, 30).unwrap());
        assert_eq!(d, 2 * DAY_MS);
    }

    #[tokio::test]
    async fn llm_extraction_rejects_garbage() {
        let summarizer = engram_test_utils::MockSummarizer::new();
        summarizer.push_response("sometime in the past, I believe");
        assert!(extract_semantic_time_llm(&summarizer, "the offsite", NOW).await.is_none());
    }
}
