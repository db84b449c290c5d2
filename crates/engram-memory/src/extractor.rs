// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic extraction: distils an episode summary into short reusable
//! facts and dedupes them against existing neighbours.

use engram_core::vector::cosine_distance;
use engram_core::{
    EmbeddingAdapter, EmbeddingInput, EmbeddingTask, EngramError, SummarizerAdapter, Table,
    VectorStoreAdapter,
};
use tracing::debug;
use uuid::Uuid;

use crate::types::Semantic;

/// Cosine distance below which a candidate duplicates an existing fact.
const DEDUPE_THRESHOLD: f32 = 0.15;

/// Maximum fact length in characters.
const FACT_CHAR_LIMIT: usize = 200;

/// Neighbours consulted per candidate during dedupe.
const DEDUPE_NEIGHBORS: usize = 5;

/// Extracts 1-3 reusable facts from episode summaries.
pub struct SemanticExtractor {
    dedupe_threshold: f32,
}

impl SemanticExtractor {
    pub fn new() -> Self {
        Self {
            dedupe_threshold: DEDUPE_THRESHOLD,
        }
    }

    /// Extract facts from an episode, embed them, and drop candidates too
    /// close to existing semantics. Returned facts carry no theme
    /// assignment yet and point back at the source episode.
    pub async fn extract(
        &self,
        episode: &crate::types::Episode,
        summarizer: &dyn SummarizerAdapter,
        embedder: &dyn EmbeddingAdapter,
        store: &dyn VectorStoreAdapter,
    ) -> Result<Vec<Semantic>, EngramError> {
        let prompt = format!(
            "Extract 1-3 short reusable facts from this conversation summary. \
             One fact per line, nothing else. Skip greetings, small talk, and \
             process chatter. Each fact must stand alone without the summary. \
             Answer in the language of the input.\n\nSummary:\n{}",
            episode.summary
        );
        let response = summarizer.complete(&prompt, 256).await?;

        let candidates: Vec<String> = response
            .lines()
            .map(clean_fact_line)
            .filter(|line| !line.is_empty())
            .take(3)
            .collect();
        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let output = embedder
            .embed(EmbeddingInput {
                texts: candidates.clone(),
                task: EmbeddingTask::TextMatching,
            })
            .await?;
        if output.embeddings.len() != candidates.len() {
            return Err(EngramError::Embedding {
                message: format!(
                    "expected {} embeddings, got {}",
                    candidates.len(),
                    output.embeddings.len()
                ),
                source: None,
            });
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut facts = Vec::new();
        for (content, embedding) in candidates.into_iter().zip(output.embeddings) {
            if self
                .is_duplicate(&embedding, store)
                .await?
            {
                debug!(fact = %content, "dropped near-duplicate fact");
                continue;
            }
            facts.push(Semantic {
                id: Uuid::new_v4().to_string(),
                content,
                embedding,
                created_at: now,
                updated_at: now,
                theme_id: String::new(),
                episode_ids: vec![episode.id.clone()],
                neighbor_ids: vec![],
            });
        }
        Ok(facts)
    }

    /// Whether a candidate embedding is within the dedupe distance of any
    /// existing stored semantic.
    async fn is_duplicate(
        &self,
        embedding: &[f32],
        store: &dyn VectorStoreAdapter,
    ) -> Result<bool, EngramError> {
        let neighbors = store
            .search(Table::Semantics, embedding, DEDUPE_NEIGHBORS)
            .await?;
        Ok(neighbors.iter().any(|scored| {
            cosine_distance(embedding, &scored.record.vector) < self.dedupe_threshold
        }))
    }
}

impl Default for SemanticExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip list markers and enforce the fact length cap.
fn clean_fact_line(line: &str) -> String {
    let trimmed = line
        .trim()
        .trim_start_matches(['-', '*', '•'])
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['.', ')', ':'])
        .trim();
    trimmed.chars().take(FACT_CHAR_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_store::SqliteVectorStore;
    use engram_test_utils::{MockEmbedder, MockSummarizer};

    fn episode(summary: &str) -> crate::types::Episode {
        crate::types::Episode {
            id: "ep-1".into(),
            summary: summary.into(),
            session_id: "s1".into(),
            turn_start: 0,
            turn_end: 4,
            message_count: 5,
            created_at: 1_700_000_000_000,
            embedding: vec![0.1; 16],
            raw_messages: "[]".into(),
        }
    }

    #[test]
    fn clean_fact_line_strips_markers() {
        assert_eq!(clean_fact_line("- uses Postgres 16"), "uses Postgres 16");
        assert_eq!(clean_fact_line("1. deploys on Fridays"), "deploys on Fridays");
        assert_eq!(clean_fact_line("* likes terse answers"), "likes terse answers");
        assert_eq!(clean_fact_line("   plain fact   "), "plain fact");
    }

    #[test]
    fn clean_fact_line_caps_length() {
        let long = "a".repeat(400);
        assert_eq!(clean_fact_line(&long).chars().count(), 200);
    }

    #[tokio::test]
    async fn extract_returns_facts_with_episode_pointer() {
        let store = SqliteVectorStore::open(None).await.unwrap();
        let summarizer = MockSummarizer::new();
        summarizer.push_response(
            "- The project uses Postgres 16\n- Deploys happen every Friday",
        );
        let embedder = MockEmbedder::new(16);

        let extractor = SemanticExtractor::new();
        let facts = extractor
            .extract(&episode("Weekly infra sync"), &summarizer, &embedder, &store)
            .await
            .unwrap();

        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].content, "The project uses Postgres 16");
        assert_eq!(facts[0].episode_ids, vec!["ep-1"]);
        assert!(facts[0].theme_id.is_empty(), "no theme assignment yet");
        assert_eq!(facts[0].embedding.len(), 16);
    }

    #[tokio::test]
    async fn extract_caps_at_three_facts() {
        let store = SqliteVectorStore::open(None).await.unwrap();
        let summarizer = MockSummarizer::new();
        summarizer.push_response("fact one here\nfact two here\nfact three here\nfact four here");
        let embedder = MockEmbedder::new(16);

        let extractor = SemanticExtractor::new();
        let facts = extractor
            .extract(&episode("Busy episode"), &summarizer, &embedder, &store)
            .await
            .unwrap();
        assert_eq!(facts.len(), 3);
    }

    #[tokio::test]
    async fn extract_dedupes_against_stored_semantics() {
        let store = SqliteVectorStore::open(None).await.unwrap();
        let embedder = MockEmbedder::new(16);

        // Store an existing fact with the exact same wording; the mock
        // embedder maps equal text to equal vectors, distance 0.
        let existing_text = "The project uses Postgres 16";
        let existing_vec = embedder.embed_one(existing_text);
        let existing = Semantic {
            id: "sem-old".into(),
            content: existing_text.into(),
            embedding: existing_vec,
            created_at: 0,
            updated_at: 0,
            theme_id: "th-1".into(),
            episode_ids: vec!["ep-0".into()],
            neighbor_ids: vec![],
        };
        store.add(Table::Semantics, &existing.to_record()).await.unwrap();

        let summarizer = MockSummarizer::new();
        summarizer.push_response(&format!("{existing_text}\nA genuinely novel deployment fact"));

        let extractor = SemanticExtractor::new();
        let facts = extractor
            .extract(&episode("Repeat discussion"), &summarizer, &embedder, &store)
            .await
            .unwrap();

        assert_eq!(facts.len(), 1, "duplicate must be dropped");
        assert!(facts[0].content.contains("novel"));
    }

    #[tokio::test]
    async fn extract_empty_response_yields_nothing() {
        let store = SqliteVectorStore::open(None).await.unwrap();
        let summarizer = MockSummarizer::new();
        summarizer.push_response("   \n  ");
        let embedder = MockEmbedder::new(16);

        let extractor = SemanticExtractor::new();
        let facts = extractor
            .extract(&episode("Small talk only"), &summarizer, &embedder, &store)
            .await
            .unwrap();
        assert!(facts.is_empty());
    }
}
