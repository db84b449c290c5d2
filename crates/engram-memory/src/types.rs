// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hierarchy domain types: episodes, semantic facts, themes, temporal
//! events, and retrieval traces, with their store-record conversions.

use engram_core::types::{list_to_field, StoredRecord};
use serde::{Deserialize, Serialize};

/// Summary of a short contiguous message batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub id: String,
    /// Summary text, at most ~100 tokens.
    pub summary: String,
    pub session_id: String,
    pub turn_start: u32,
    pub turn_end: u32,
    pub message_count: u32,
    /// Milliseconds since the epoch.
    pub created_at: i64,
    pub embedding: Vec<f32>,
    /// JSON-serialised original messages, bodies truncated to 500 chars.
    /// Blanked to `"[]"` after the retention window.
    pub raw_messages: String,
}

impl Episode {
    pub fn to_record(&self) -> StoredRecord {
        StoredRecord::new(self.id.clone(), self.embedding.clone())
            .with_field("summary", serde_json::json!(self.summary))
            .with_field("session_id", serde_json::json!(self.session_id))
            .with_field("turn_start", serde_json::json!(self.turn_start))
            .with_field("turn_end", serde_json::json!(self.turn_end))
            .with_field("message_count", serde_json::json!(self.message_count))
            .with_field("created_at", serde_json::json!(self.created_at))
            .with_field("raw_messages", serde_json::json!(self.raw_messages))
    }

    pub fn from_record(record: &StoredRecord) -> Self {
        Self {
            id: record.id.clone(),
            summary: record.str_field("summary"),
            session_id: record.str_field("session_id"),
            turn_start: record.i64_field("turn_start") as u32,
            turn_end: record.i64_field("turn_end") as u32,
            message_count: record.i64_field("message_count") as u32,
            created_at: record.i64_field("created_at"),
            embedding: record.vector.clone(),
            raw_messages: record.str_field("raw_messages"),
        }
    }
}

/// A short reusable fact distilled from one or more episodes.
///
/// Belongs to exactly one theme; episode back-pointers are ids, never
/// owning references, and may dangle after decay.
#[derive(Debug, Clone, PartialEq)]
pub struct Semantic {
    pub id: String,
    /// Fact content, at most 200 chars.
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Owning theme id.
    pub theme_id: String,
    /// Source episode ids.
    pub episode_ids: Vec<String>,
    /// Nearest-neighbour semantic ids.
    pub neighbor_ids: Vec<String>,
}

impl Semantic {
    pub fn to_record(&self) -> StoredRecord {
        StoredRecord::new(self.id.clone(), self.embedding.clone())
            .with_field("content", serde_json::json!(self.content))
            .with_field("created_at", serde_json::json!(self.created_at))
            .with_field("updated_at", serde_json::json!(self.updated_at))
            .with_field("theme_id", serde_json::json!(self.theme_id))
            .with_field("episode_ids", list_to_field(&self.episode_ids))
            .with_field("neighbor_ids", list_to_field(&self.neighbor_ids))
    }

    pub fn from_record(record: &StoredRecord) -> Self {
        Self {
            id: record.id.clone(),
            content: record.str_field("content"),
            embedding: record.vector.clone(),
            created_at: record.i64_field("created_at"),
            updated_at: record.i64_field("updated_at"),
            theme_id: record.str_field("theme_id"),
            episode_ids: record.list_field("episode_ids"),
            neighbor_ids: record.list_field("neighbor_ids"),
        }
    }
}

/// A cluster of semantically related facts exposed as a topic label.
///
/// Themes own their semantics by id and point weakly at neighbour themes;
/// they are never deleted by decay, only marked dormant by inactivity.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub id: String,
    /// Human-readable name, at most 50 chars.
    pub name: String,
    pub summary: String,
    /// Centroid of the member semantics' embeddings (approximate).
    pub embedding: Vec<f32>,
    /// Ordered owned semantic ids; the inverse of semantic→theme pointers.
    pub semantic_ids: Vec<String>,
    pub message_count: u32,
    pub last_active: i64,
    /// Nearest-neighbour theme ids, descending similarity.
    pub neighbor_ids: Vec<String>,
}

impl Theme {
    pub fn to_record(&self) -> StoredRecord {
        StoredRecord::new(self.id.clone(), self.embedding.clone())
            .with_field("name", serde_json::json!(self.name))
            .with_field("summary", serde_json::json!(self.summary))
            .with_field("semantic_ids", list_to_field(&self.semantic_ids))
            .with_field("message_count", serde_json::json!(self.message_count))
            .with_field("last_active", serde_json::json!(self.last_active))
            .with_field("neighbor_ids", list_to_field(&self.neighbor_ids))
    }

    pub fn from_record(record: &StoredRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.str_field("name"),
            summary: record.str_field("summary"),
            embedding: record.vector.clone(),
            semantic_ids: record.list_field("semantic_ids"),
            message_count: record.i64_field("message_count") as u32,
            last_active: record.i64_field("last_active"),
            neighbor_ids: record.list_field("neighbor_ids"),
        }
    }
}

/// Weekly per-user profile; one latest row per (user, phase).
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub user_id: String,
    /// ISO-week phase label, e.g. `2026-W31`.
    pub phase: String,
    pub behavioral: String,
    pub cognitive: String,
    /// Older phases merged into one global text.
    pub global_summary: String,
    pub embedding: Vec<f32>,
    pub updated_at: i64,
}

impl UserProfile {
    pub fn to_record(&self) -> StoredRecord {
        StoredRecord::new(self.id.clone(), self.embedding.clone())
            .with_field("user_id", serde_json::json!(self.user_id))
            .with_field("phase", serde_json::json!(self.phase))
            .with_field("behavioral", serde_json::json!(self.behavioral))
            .with_field("cognitive", serde_json::json!(self.cognitive))
            .with_field("global_summary", serde_json::json!(self.global_summary))
            .with_field("updated_at", serde_json::json!(self.updated_at))
    }

    pub fn from_record(record: &StoredRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.str_field("user_id"),
            phase: record.str_field("phase"),
            behavioral: record.str_field("behavioral"),
            cognitive: record.str_field("cognitive"),
            global_summary: record.str_field("global_summary"),
            embedding: record.vector.clone(),
            updated_at: record.i64_field("updated_at"),
        }
    }
}

/// Shadow of an episode indexed by when the event *happened* rather than
/// when it was discussed.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalEvent {
    /// Equals the source episode id.
    pub id: String,
    pub content: String,
    /// When the described event happened.
    pub semantic_time: i64,
    /// When it was discussed.
    pub dialogue_time: i64,
    /// Event duration in milliseconds; zero for point events.
    pub duration_ms: i64,
    pub episode_id: String,
    pub embedding: Vec<f32>,
}

/// A span-valued memory covering a contiguous real-world time range.
#[derive(Debug, Clone, PartialEq)]
pub struct DurativeMemory {
    pub id: String,
    pub summary: String,
    pub start_time: i64,
    pub end_time: i64,
    pub event_ids: Vec<String>,
    pub theme_tag: String,
    pub embedding: Vec<f32>,
}

/// Stage-II retrieval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage2Decision {
    Yes,
    Partial,
    No,
}

impl Stage2Decision {
    /// Parse a raw model response. Matching is prefix-based on the
    /// trimmed, uppercased text; anything unrecognised is `Partial`.
    pub fn parse(response: &str) -> Self {
        let upper = response.trim().to_uppercase();
        if upper.starts_with("YES") {
            Stage2Decision::Yes
        } else if upper.starts_with("NO") {
            Stage2Decision::No
        } else {
            Stage2Decision::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage2Decision::Yes => "YES",
            Stage2Decision::Partial => "PARTIAL",
            Stage2Decision::No => "NO",
        }
    }
}

/// Post-hoc satisfaction rating of a retrieval trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfaction {
    Satisfied,
    Unsatisfied,
    Unknown,
}

impl Satisfaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Satisfaction::Satisfied => "satisfied",
            Satisfaction::Unsatisfied => "unsatisfied",
            Satisfaction::Unknown => "unknown",
        }
    }
}

/// One observability record per retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalTrace {
    pub query: String,
    pub timestamp: i64,
    pub theme_ids: Vec<String>,
    /// Previews of the selected facts (truncated content).
    pub fact_previews: Vec<String>,
    pub episode_ids: Vec<String>,
    pub decision: Stage2Decision,
    pub tokens: u32,
    pub satisfaction: Satisfaction,
    pub agent_id: String,
}

/// Result of a full two-stage retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalBundle {
    pub themes: Vec<Theme>,
    pub semantics: Vec<Semantic>,
    pub episodes: Vec<Episode>,
    /// Neighbour themes of the selection, recorded but not expanded.
    pub neighbor_theme_ids: Vec<String>,
    pub decision: Stage2Decision,
    pub estimated_tokens: u32,
}

impl RetrievalBundle {
    /// An empty bundle with decision NO.
    pub fn empty() -> Self {
        Self {
            themes: vec![],
            semantics: vec![],
            episodes: vec![],
            neighbor_theme_ids: vec![],
            decision: Stage2Decision::No,
            estimated_tokens: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty() && self.semantics.is_empty() && self.episodes.is_empty()
    }
}
