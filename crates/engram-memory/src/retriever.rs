// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-stage top-down retriever.
//!
//! Stage I selects themes by greedy submodular coverage and ranks their
//! facts; Stage II asks the summarizer whether those facts suffice and,
//! if not, expands to episode summaries within a bounded share of the
//! token budget.

use std::collections::HashSet;
use std::sync::Arc;

use engram_config::DecayConfig;
use engram_core::tokens::estimate_tokens;
use engram_core::vector::cosine_similarity;
use engram_core::{EngramError, SummarizerAdapter, Table, VectorStoreAdapter};
use tracing::debug;

use crate::decay::decay_weight;
use crate::types::{Episode, RetrievalBundle, Semantic, Stage2Decision, Theme};

/// Themes fetched as Stage-I candidates.
const CANDIDATE_THEMES: usize = 5;
/// Themes greedily selected.
const SELECTED_THEMES: usize = 3;
/// Facts kept after ranking.
const SELECTED_FACTS: usize = 10;
/// Flat token estimate per theme header.
const TOKENS_PER_THEME: u32 = 15;
/// Share of the token budget available to Stage-II episode expansion.
const EPISODE_BUDGET_SHARE: f64 = 0.40;

/// Two-stage retriever over the theme/semantic/episode hierarchy.
pub struct TopDownRetriever {
    store: Arc<dyn VectorStoreAdapter>,
    token_budget: u32,
    /// When present, candidate facts are down-weighted by age.
    decay: Option<DecayConfig>,
}

impl TopDownRetriever {
    pub fn new(store: Arc<dyn VectorStoreAdapter>, token_budget: u32) -> Self {
        Self {
            store,
            token_budget,
            decay: None,
        }
    }

    /// Enable age-based down-weighting of candidate facts.
    pub fn with_decay(mut self, decay: DecayConfig) -> Self {
        self.decay = Some(decay);
        self
    }

    /// Run both stages for a query.
    ///
    /// `alpha` weighs coverage gain against relevance in Stage I and is
    /// tuned by the feedback loop. The summarizer is optional; without
    /// one, Stage II conservatively treats the facts as partial.
    pub async fn retrieve(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        summarizer: Option<&dyn SummarizerAdapter>,
        alpha: f64,
    ) -> Result<RetrievalBundle, EngramError> {
        // Stage I: breadth.
        let candidates = self
            .store
            .search(Table::Themes, query_embedding, CANDIDATE_THEMES)
            .await?;
        if candidates.is_empty() {
            return Ok(RetrievalBundle::empty());
        }
        let candidates: Vec<(Theme, f32)> = candidates
            .iter()
            .map(|hit| (Theme::from_record(&hit.record), hit.similarity))
            .collect();

        let themes = select_by_coverage(&candidates, alpha, SELECTED_THEMES);

        let mut neighbor_theme_ids: Vec<String> = Vec::new();
        for theme in &themes {
            for id in &theme.neighbor_ids {
                if !neighbor_theme_ids.contains(id) && !themes.iter().any(|t| &t.id == id) {
                    neighbor_theme_ids.push(id.clone());
                }
            }
        }

        let mut semantics: Vec<Semantic> = Vec::new();
        for theme in &themes {
            for id in &theme.semantic_ids {
                if let Some(record) = self.store.get(Table::Semantics, id).await? {
                    semantics.push(Semantic::from_record(&record));
                }
            }
        }
        let now = chrono::Utc::now().timestamp_millis();
        let rank = |s: &Semantic| {
            let similarity = cosine_similarity(query_embedding, &s.embedding) as f64;
            match &self.decay {
                Some(decay) => {
                    similarity
                        * decay_weight(s.created_at, now, Some(decay.semantic_half_life_days))
                }
                None => similarity,
            }
        };
        semantics.sort_by(|a, b| {
            rank(b).partial_cmp(&rank(a)).unwrap_or(std::cmp::Ordering::Equal)
        });
        semantics.truncate(SELECTED_FACTS);

        // Stage II: depth.
        if semantics.is_empty() {
            let mut bundle = RetrievalBundle::empty();
            bundle.themes = themes;
            bundle.neighbor_theme_ids = neighbor_theme_ids;
            bundle.estimated_tokens = estimate_bundle_tokens(&bundle);
            return Ok(bundle);
        }

        let decision = match summarizer {
            Some(s) => self.sufficiency_probe(query_text, &semantics, s).await,
            None => Stage2Decision::Partial,
        };

        let episodes = if decision == Stage2Decision::Yes {
            vec![]
        } else {
            self.expand_episodes(&semantics).await?
        };

        let mut bundle = RetrievalBundle {
            themes,
            semantics,
            episodes,
            neighbor_theme_ids,
            decision,
            estimated_tokens: 0,
        };
        bundle.estimated_tokens = estimate_bundle_tokens(&bundle);
        debug!(
            themes = bundle.themes.len(),
            facts = bundle.semantics.len(),
            episodes = bundle.episodes.len(),
            decision = bundle.decision.as_str(),
            tokens = bundle.estimated_tokens,
            "retrieval complete"
        );
        Ok(bundle)
    }

    /// Ask the summarizer whether the facts fully answer the question.
    /// Any failure or unexpected response counts as PARTIAL.
    async fn sufficiency_probe(
        &self,
        query: &str,
        semantics: &[Semantic],
        summarizer: &dyn SummarizerAdapter,
    ) -> Stage2Decision {
        let facts: String = semantics
            .iter()
            .map(|s| format!("- {}", s.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Given these facts:\n{facts}\n\nCan they fully answer this \
             question: \"{query}\"? Reply with exactly one word: YES, \
             PARTIAL, or NO."
        );
        match summarizer.complete(&prompt, 8).await {
            Ok(response) => Stage2Decision::parse(&response),
            Err(e) => {
                debug!(error = %e, "sufficiency probe failed, treating as PARTIAL");
                Stage2Decision::Partial
            }
        }
    }

    /// Union the episodes referenced by the surviving facts and keep as
    /// many as fit in the episode share of the token budget.
    async fn expand_episodes(&self, semantics: &[Semantic]) -> Result<Vec<Episode>, EngramError> {
        let mut seen = HashSet::new();
        let mut ordered_ids = Vec::new();
        for semantic in semantics {
            for id in &semantic.episode_ids {
                if seen.insert(id.clone()) {
                    ordered_ids.push(id.clone());
                }
            }
        }

        let episode_budget = (self.token_budget as f64 * EPISODE_BUDGET_SHARE) as u32;
        let mut used = 0u32;
        let mut episodes = Vec::new();
        for id in ordered_ids {
            let Some(record) = self.store.get(Table::Episodes, &id).await? else {
                // Back-pointers may dangle after decay.
                continue;
            };
            let episode = Episode::from_record(&record);
            let cost = estimate_tokens(&episode.summary);
            if used + cost > episode_budget {
                continue;
            }
            used += cost;
            episodes.push(episode);
        }
        Ok(episodes)
    }
}

/// Greedy submodular theme selection: maximise
/// `alpha * coverage_gain + (1 - alpha) * relevance`, where coverage gain
/// is the fraction of the candidate's facts not yet covered.
fn select_by_coverage(candidates: &[(Theme, f32)], alpha: f64, limit: usize) -> Vec<Theme> {
    let mut covered: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&(Theme, f32)> = candidates.iter().collect();
    let mut selected = Vec::new();

    while selected.len() < limit && !remaining.is_empty() {
        let (best_pos, _) = remaining
            .iter()
            .enumerate()
            .map(|(pos, (theme, relevance))| {
                let total = theme.semantic_ids.len() as f64;
                let uncovered = theme
                    .semantic_ids
                    .iter()
                    .filter(|id| !covered.contains(id.as_str()))
                    .count() as f64;
                let coverage_gain = if total > 0.0 { uncovered / total } else { 0.0 };
                let score =
                    alpha * coverage_gain + (1.0 - alpha) * (*relevance as f64).clamp(0.0, 1.0);
                (pos, score)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .expect("remaining is non-empty");

        let (theme, _) = remaining.remove(best_pos);
        for id in &theme.semantic_ids {
            covered.insert(id.as_str());
        }
        selected.push(theme.clone());
    }
    selected
}

/// Token totals: facts by content length, themes flat, episodes by summary.
pub fn estimate_bundle_tokens(bundle: &RetrievalBundle) -> u32 {
    let fact_tokens: u32 = bundle
        .semantics
        .iter()
        .map(|s| estimate_tokens(&s.content))
        .sum();
    let theme_tokens = bundle.themes.len() as u32 * TOKENS_PER_THEME;
    let episode_tokens: u32 = bundle
        .episodes
        .iter()
        .map(|e| estimate_tokens(&e.summary))
        .sum();
    fact_tokens + theme_tokens + episode_tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_store::SqliteVectorStore;
    use engram_test_utils::{MockEmbedder, MockSummarizer};

    fn theme(id: &str, semantic_ids: &[&str], embedding: Vec<f32>) -> Theme {
        Theme {
            id: id.into(),
            name: format!("theme {id}"),
            summary: String::new(),
            embedding,
            semantic_ids: semantic_ids.iter().map(|s| s.to_string()).collect(),
            message_count: semantic_ids.len() as u32,
            last_active: 0,
            neighbor_ids: vec![],
        }
    }

    fn semantic(id: &str, theme_id: &str, content: &str, embedding: Vec<f32>) -> Semantic {
        Semantic {
            id: id.into(),
            content: content.into(),
            embedding,
            created_at: 0,
            updated_at: 0,
            theme_id: theme_id.into(),
            episode_ids: vec![format!("ep-{id}")],
            neighbor_ids: vec![],
        }
    }

    fn episode(id: &str, summary: &str, embedding: Vec<f32>) -> Episode {
        Episode {
            id: id.into(),
            summary: summary.into(),
            session_id: "s1".into(),
            turn_start: 0,
            turn_end: 4,
            message_count: 5,
            created_at: 0,
            embedding,
            raw_messages: "[]".into(),
        }
    }

    async fn seeded_store(embedder: &MockEmbedder) -> Arc<SqliteVectorStore> {
        let store = Arc::new(SqliteVectorStore::open(None).await.unwrap());
        let e = |text: &str| embedder.embed_one(text);

        let s1 = semantic("s1", "t1", "the api gateway uses rate limiting", e("the api gateway uses rate limiting"));
        let s2 = semantic("s2", "t1", "the api gateway runs on port 8443", e("the api gateway runs on port 8443"));
        let s3 = semantic("s3", "t2", "the garden needs watering on fridays", e("the garden needs watering on fridays"));
        for s in [&s1, &s2, &s3] {
            store.add(Table::Semantics, &s.to_record()).await.unwrap();
        }

        let t1 = theme("t1", &["s1", "s2"], e("api gateway rate limiting port"));
        let t2 = theme("t2", &["s3"], e("garden watering fridays"));
        store.add(Table::Themes, &t1.to_record()).await.unwrap();
        store.add(Table::Themes, &t2.to_record()).await.unwrap();

        let ep1 = episode("ep-s1", "Configured rate limiting on the api gateway", e("configured rate limiting"));
        let ep2 = episode("ep-s2", "Moved the api gateway to port 8443", e("moved gateway port"));
        store.add(Table::Episodes, &ep1.to_record()).await.unwrap();
        store.add(Table::Episodes, &ep2.to_record()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn empty_store_returns_empty_bundle() {
        let store = Arc::new(SqliteVectorStore::open(None).await.unwrap());
        let retriever = TopDownRetriever::new(store, 500);
        let embedder = MockEmbedder::new(32);
        let bundle = retriever
            .retrieve("anything", &embedder.embed_one("anything"), None, 0.5)
            .await
            .unwrap();
        assert!(bundle.is_empty());
        assert_eq!(bundle.decision, Stage2Decision::No);
    }

    #[tokio::test]
    async fn yes_decision_returns_zero_episodes() {
        let embedder = MockEmbedder::new(32);
        let store = seeded_store(&embedder).await;
        let retriever = TopDownRetriever::new(store, 500);

        let summarizer = MockSummarizer::new();
        summarizer.push_response("YES");

        let bundle = retriever
            .retrieve(
                "what port does the api gateway use",
                &embedder.embed_one("api gateway port"),
                Some(&summarizer),
                0.5,
            )
            .await
            .unwrap();
        assert_eq!(bundle.decision, Stage2Decision::Yes);
        assert!(bundle.episodes.is_empty());
        assert!(!bundle.semantics.is_empty());
    }

    #[tokio::test]
    async fn partial_decision_expands_referenced_episodes() {
        let embedder = MockEmbedder::new(32);
        let store = seeded_store(&embedder).await;
        let retriever = TopDownRetriever::new(store, 500);

        let summarizer = MockSummarizer::new();
        summarizer.push_response("PARTIAL");

        let bundle = retriever
            .retrieve(
                "how is the api gateway configured",
                &embedder.embed_one("api gateway configured"),
                Some(&summarizer),
                0.5,
            )
            .await
            .unwrap();
        assert_eq!(bundle.decision, Stage2Decision::Partial);
        assert!(!bundle.episodes.is_empty());

        // Every returned episode is referenced by a returned semantic.
        let referenced: HashSet<&String> = bundle
            .semantics
            .iter()
            .flat_map(|s| s.episode_ids.iter())
            .collect();
        for episode in &bundle.episodes {
            assert!(referenced.contains(&episode.id));
        }
    }

    #[tokio::test]
    async fn garbage_probe_response_treated_as_partial() {
        let embedder = MockEmbedder::new(32);
        let store = seeded_store(&embedder).await;
        let retriever = TopDownRetriever::new(store, 500);

        let summarizer = MockSummarizer::new();
        summarizer.push_response("hmm, I would have to think about that");

        let bundle = retriever
            .retrieve(
                "api gateway",
                &embedder.embed_one("api gateway"),
                Some(&summarizer),
                0.5,
            )
            .await
            .unwrap();
        assert_eq!(bundle.decision, Stage2Decision::Partial);
    }

    #[tokio::test]
    async fn missing_summarizer_defaults_to_partial() {
        let embedder = MockEmbedder::new(32);
        let store = seeded_store(&embedder).await;
        let retriever = TopDownRetriever::new(store, 500);

        let bundle = retriever
            .retrieve("api gateway", &embedder.embed_one("api gateway"), None, 0.5)
            .await
            .unwrap();
        assert_eq!(bundle.decision, Stage2Decision::Partial);
    }

    #[tokio::test]
    async fn episode_expansion_respects_budget_share() {
        let embedder = MockEmbedder::new(32);
        let store = seeded_store(&embedder).await;
        // Tiny budget: 40% of 10 tokens = 4 tokens, below any summary.
        let retriever = TopDownRetriever::new(store, 10);

        let summarizer = MockSummarizer::new();
        summarizer.push_response("NO");

        let bundle = retriever
            .retrieve(
                "api gateway",
                &embedder.embed_one("api gateway"),
                Some(&summarizer),
                0.5,
            )
            .await
            .unwrap();
        assert_eq!(bundle.decision, Stage2Decision::No);
        assert!(bundle.episodes.is_empty(), "no episode fits 4 tokens");
    }

    #[test]
    fn coverage_selection_prefers_uncovered_facts() {
        let a = theme("a", &["s1", "s2"], vec![1.0, 0.0]);
        // b duplicates a's facts; c brings new ones but lower relevance.
        let b = theme("b", &["s1", "s2"], vec![1.0, 0.0]);
        let c = theme("c", &["s3", "s4"], vec![0.5, 0.5]);
        let candidates = vec![(a, 0.95f32), (b, 0.94f32), (c, 0.60f32)];

        let selected = select_by_coverage(&candidates, 0.5, 2);
        let ids: Vec<&str> = selected.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids[0], "a");
        // With coverage weighting, c's fresh facts beat b's duplicates.
        assert_eq!(ids[1], "c");
    }

    #[test]
    fn coverage_selection_alpha_zero_is_pure_relevance() {
        let a = theme("a", &["s1"], vec![1.0, 0.0]);
        let b = theme("b", &["s1"], vec![1.0, 0.0]);
        let candidates = vec![(a, 0.9f32), (b, 0.95f32)];
        let selected = select_by_coverage(&candidates, 0.0, 1);
        assert_eq!(selected[0].id, "b");
    }

    #[test]
    fn bundle_token_estimate_counts_all_parts() {
        let bundle = RetrievalBundle {
            themes: vec![theme("t", &["s"], vec![1.0])],
            semantics: vec![semantic("s", "t", "abcdefgh", vec![1.0])],
            episodes: vec![episode("e", "abcd", vec![1.0])],
            neighbor_theme_ids: vec![],
            decision: Stage2Decision::Partial,
            estimated_tokens: 0,
        };
        // theme 15 + fact 2 + episode 1
        assert_eq!(estimate_bundle_tokens(&bundle), 18);
    }
}
