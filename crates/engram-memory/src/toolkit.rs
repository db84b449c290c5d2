// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Autonomous memory-edit decisions, made once per turn without further
//! LLM calls. `decide` is a pure function of its inputs so running it
//! twice on the same turn yields the same decision set.

use engram_core::{EngramError, ExternalTools, MemoryDecision};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::active::{token_overlap, tokenize};

/// Maximum store decisions per turn.
const MAX_STORES_PER_TURN: usize = 3;
/// Maximum discard decisions per turn.
const MAX_DISCARDS_PER_TURN: usize = 2;
/// Sentence length bounds for storable facts.
const STORE_MIN_CHARS: usize = 15;
const STORE_MAX_CHARS: usize = 300;
/// A candidate overlapping an existing memory this much is redundant.
const STORE_OVERLAP_LIMIT: f64 = 0.40;
/// Tokens a stored memory must share with a correction to be discarded.
const DISCARD_SHARED_TOKENS: usize = 2;
/// Cluster size that triggers consolidation.
const SUMMARIZE_CLUSTER_SIZE: usize = 5;
/// Pairwise overlap that groups memories into a cluster.
const SUMMARIZE_OVERLAP: f64 = 0.30;

fn factual_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| {
        Regex::new(
            r"(?i)(\b(is|are|was|were|costs?|uses?|supports?|requires?|runs?|released|defaults?)\b|是|为|使用|支持|需要|版本)",
        )
        .unwrap()
    })
}

fn correction_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| {
        Regex::new(r"(?i)(\b(no|wrong|incorrect|actually|not right|that's not)\b|不对|错了|不是|应该是)")
            .unwrap()
    })
}

fn version_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| Regex::new(r"\bv?\d+\.\d+(\.\d+)?\b").unwrap())
}

fn code_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| Regex::new(r"([a-z]+[A-Z][a-zA-Z]*|\w+::\w+|\w+\(\)|`[^`]+`)").unwrap())
}

/// Emits per-turn store / discard / summarize decisions.
#[derive(Debug, Clone, Default)]
pub struct MemoryToolkit;

impl MemoryToolkit {
    pub fn new() -> Self {
        Self
    }

    /// Decide what to do with this turn's exchange. Deterministic.
    pub fn decide(
        &self,
        user_query: &str,
        assistant_output: &str,
        existing_memories: &[String],
    ) -> Vec<MemoryDecision> {
        let mut decisions = Vec::new();
        decisions.extend(self.store_decisions(user_query, assistant_output, existing_memories));
        decisions.extend(self.discard_decisions(user_query, existing_memories));
        decisions.extend(self.summarize_decisions(existing_memories));
        decisions
    }

    /// Factual sentences from the assistant output worth keeping.
    fn store_decisions(
        &self,
        user_query: &str,
        assistant_output: &str,
        existing_memories: &[String],
    ) -> Vec<MemoryDecision> {
        let mut out = Vec::new();
        for sentence in split_sentences(assistant_output) {
            if out.len() >= MAX_STORES_PER_TURN {
                break;
            }
            let chars = sentence.chars().count();
            if chars < STORE_MIN_CHARS || chars > STORE_MAX_CHARS {
                continue;
            }
            if !factual_pattern().is_match(&sentence) {
                continue;
            }
            let redundant = existing_memories
                .iter()
                .any(|memory| token_overlap(&sentence, memory) >= STORE_OVERLAP_LIMIT);
            if redundant {
                continue;
            }
            let importance = importance_score(&sentence, user_query);
            out.push(MemoryDecision::Store {
                content: sentence,
                category: "fact".to_string(),
                importance,
            });
        }
        out
    }

    /// When the user corrects us, target stored memories sharing tokens
    /// with the correction.
    fn discard_decisions(
        &self,
        user_query: &str,
        existing_memories: &[String],
    ) -> Vec<MemoryDecision> {
        if !correction_pattern().is_match(user_query) {
            return vec![];
        }
        let correction_tokens: std::collections::HashSet<String> =
            tokenize(user_query).into_iter().collect();
        existing_memories
            .iter()
            .filter(|memory| {
                let shared = tokenize(memory)
                    .into_iter()
                    .collect::<std::collections::HashSet<_>>()
                    .intersection(&correction_tokens)
                    .count();
                shared >= DISCARD_SHARED_TOKENS
            })
            .take(MAX_DISCARDS_PER_TURN)
            .map(|memory| MemoryDecision::Discard {
                query: memory.clone(),
            })
            .collect()
    }

    /// Consolidate clusters of five or more overlapping memories.
    fn summarize_decisions(&self, existing_memories: &[String]) -> Vec<MemoryDecision> {
        let mut clusters: Vec<Vec<&String>> = Vec::new();
        for memory in existing_memories {
            let slot = clusters.iter_mut().find(|cluster| {
                symmetric_overlap(cluster[0], memory) > SUMMARIZE_OVERLAP
            });
            match slot {
                Some(cluster) => cluster.push(memory),
                None => clusters.push(vec![memory]),
            }
        }

        clusters
            .into_iter()
            .filter(|cluster| cluster.len() >= SUMMARIZE_CLUSTER_SIZE)
            .map(|cluster| {
                let sources: Vec<String> = cluster.iter().map(|m| (*m).clone()).collect();
                let summary = consolidate(&sources);
                MemoryDecision::Summarize {
                    sources,
                    summary,
                    importance: 0.9,
                }
            })
            .collect()
    }

    /// Apply decisions against the host callbacks. Absent callbacks skip
    /// the decision; failures are swallowed and counted.
    pub async fn execute(
        &self,
        decisions: &[MemoryDecision],
        tools: &ExternalTools,
    ) -> ToolkitReport {
        let mut report = ToolkitReport::default();
        let Some(memory) = &tools.memory else {
            report.skipped = decisions.len();
            return report;
        };

        for decision in decisions {
            let result: Result<(), EngramError> = match decision {
                MemoryDecision::Store {
                    content,
                    category,
                    importance,
                } => memory.store(content, category, *importance).await,
                MemoryDecision::Discard { query } => memory.forget(query).await,
                MemoryDecision::Summarize {
                    sources,
                    summary,
                    importance,
                } => {
                    let mut result = memory.store(summary, "consolidated", *importance).await;
                    if result.is_ok() {
                        for source in sources {
                            if let Err(e) = memory.forget(source).await {
                                result = Err(e);
                                break;
                            }
                        }
                    }
                    result
                }
                MemoryDecision::Update { target, content } => {
                    let mut result = memory.forget(target).await;
                    if result.is_ok() {
                        result = memory.store(content, "fact", 0.7).await;
                    }
                    result
                }
                MemoryDecision::Retrieve { query } => {
                    memory.recall(query).await.map(|_| ())
                }
            };
            match result {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!(error = %e, "memory decision failed");
                    report.failed += 1;
                }
            }
        }
        debug!(
            applied = report.applied,
            failed = report.failed,
            "toolkit execution complete"
        );
        report
    }
}

/// Outcome counters for one execution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolkitReport {
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Split assistant output into sentences on terminal punctuation.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '\n') {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            current.clear();
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
    sentences
}

/// Importance in [0, 1] from numbers, version tokens, query-term overlap,
/// and code-ish tokens.
fn importance_score(sentence: &str, query: &str) -> f64 {
    let mut score = 0.3f64;
    if sentence.chars().any(|c| c.is_ascii_digit()) {
        score += 0.2;
    }
    if version_pattern().is_match(sentence) {
        score += 0.2;
    }
    if token_overlap(query, sentence) > 0.3 {
        score += 0.2;
    }
    if code_pattern().is_match(sentence) {
        score += 0.1;
    }
    score.min(1.0)
}

/// Jaccard-style overlap against the smaller token set.
fn symmetric_overlap(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<String> = tokenize(a).into_iter().collect();
    let set_b: std::collections::HashSet<String> = tokenize(b).into_iter().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let shared = set_a.intersection(&set_b).count();
    shared as f64 / set_a.len().min(set_b.len()) as f64
}

/// Deterministic consolidation of a memory cluster: unique sentences in
/// first-seen order, capped.
fn consolidate(sources: &[String]) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut parts = Vec::new();
    for source in sources {
        for sentence in split_sentences(source) {
            let key: String = tokenize(&sentence).join(" ");
            if seen.insert(key) {
                parts.push(sentence);
            }
        }
    }
    let joined = parts.join(" ");
    joined.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engram_core::MemoryTool;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingMemory {
        stored: Mutex<Vec<String>>,
        forgotten: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl MemoryTool for RecordingMemory {
        async fn recall(&self, _query: &str) -> Result<Vec<String>, EngramError> {
            Ok(vec![])
        }
        async fn store(&self, content: &str, _cat: &str, _i: f64) -> Result<(), EngramError> {
            if self.fail {
                return Err(EngramError::Internal("memory store is down".into()));
            }
            self.stored.lock().unwrap().push(content.to_string());
            Ok(())
        }
        async fn forget(&self, query: &str) -> Result<(), EngramError> {
            if self.fail {
                return Err(EngramError::Internal("memory forget is down".into()));
            }
            self.forgotten.lock().unwrap().push(query.to_string());
            Ok(())
        }
    }

    #[test]
    fn stores_factual_sentences_with_importance() {
        let toolkit = MemoryToolkit::new();
        let output = "The gateway runs on port 8443. Nice weather today! \
                      The retry limit is 5 attempts.";
        let decisions = toolkit.decide("how is the gateway set up?", output, &[]);

        let stores: Vec<_> = decisions
            .iter()
            .filter(|d| matches!(d, MemoryDecision::Store { .. }))
            .collect();
        assert_eq!(stores.len(), 2);
        if let MemoryDecision::Store { content, importance, .. } = stores[0] {
            assert!(content.contains("8443"));
            assert!(*importance > 0.3, "numbers and query overlap raise importance");
        }
    }

    #[test]
    fn short_and_long_sentences_skipped() {
        let toolkit = MemoryToolkit::new();
        let long = format!("The value is {}.", "x".repeat(400));
        let output = format!("It is 5. {long}");
        let decisions = toolkit.decide("q", &output, &[]);
        assert!(decisions.is_empty());
    }

    #[test]
    fn redundant_sentences_not_stored() {
        let toolkit = MemoryToolkit::new();
        let existing = vec!["The gateway runs on port 8443".to_string()];
        let decisions = toolkit.decide(
            "q",
            "The gateway runs on port 8443.",
            &existing,
        );
        assert!(decisions
            .iter()
            .all(|d| !matches!(d, MemoryDecision::Store { .. })));
    }

    #[test]
    fn store_capped_at_three() {
        let toolkit = MemoryToolkit::new();
        let output = "The cache size is 100. The queue depth is 200. \
                      The pool size is 30. The timeout is 45 seconds. \
                      The retry count is 5.";
        let decisions = toolkit.decide("q", output, &[]);
        let stores = decisions
            .iter()
            .filter(|d| matches!(d, MemoryDecision::Store { .. }))
            .count();
        assert_eq!(stores, 3);
    }

    #[test]
    fn correction_targets_overlapping_memory() {
        let toolkit = MemoryToolkit::new();
        let existing = vec![
            "产品价格是 50 元每月".to_string(),
            "The sky is blue".to_string(),
        ];
        let decisions = toolkit.decide(
            "不对，产品价格应该是 100 元不是 50 元",
            "",
            &existing,
        );
        let discards: Vec<_> = decisions
            .iter()
            .filter_map(|d| match d {
                MemoryDecision::Discard { query } => Some(query.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(discards.len(), 1);
        assert!(discards[0].contains("50"));
    }

    #[test]
    fn no_correction_no_discard() {
        let toolkit = MemoryToolkit::new();
        let existing = vec!["The price is 50".to_string()];
        let decisions = toolkit.decide("thanks, that helps", "", &existing);
        assert!(decisions
            .iter()
            .all(|d| !matches!(d, MemoryDecision::Discard { .. })));
    }

    #[test]
    fn cluster_of_five_consolidates() {
        let toolkit = MemoryToolkit::new();
        let existing: Vec<String> = (0..5)
            .map(|i| format!("deploy pipeline step {i} uses github actions"))
            .collect();
        let decisions = toolkit.decide("q", "", &existing);
        let summaries: Vec<_> = decisions
            .iter()
            .filter(|d| matches!(d, MemoryDecision::Summarize { .. }))
            .collect();
        assert_eq!(summaries.len(), 1);
        if let MemoryDecision::Summarize { sources, importance, .. } = summaries[0] {
            assert_eq!(sources.len(), 5);
            assert_eq!(*importance, 0.9);
        }
    }

    #[test]
    fn small_cluster_does_not_consolidate() {
        let toolkit = MemoryToolkit::new();
        let existing: Vec<String> = (0..4)
            .map(|i| format!("deploy pipeline step {i} uses github actions"))
            .collect();
        let decisions = toolkit.decide("q", "", &existing);
        assert!(decisions
            .iter()
            .all(|d| !matches!(d, MemoryDecision::Summarize { .. })));
    }

    #[test]
    fn decide_is_idempotent() {
        let toolkit = MemoryToolkit::new();
        let existing: Vec<String> = (0..5)
            .map(|i| format!("deploy pipeline step {i} uses github actions"))
            .collect();
        let query = "不对，the port is wrong";
        let output = "The gateway runs on port 8443. The retry limit is 5.";
        let first = toolkit.decide(query, output, &existing);
        let second = toolkit.decide(query, output, &existing);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn execute_applies_against_callbacks() {
        let toolkit = MemoryToolkit::new();
        let memory = Arc::new(RecordingMemory::default());
        let tools = ExternalTools {
            memory: Some(memory.clone()),
            ..Default::default()
        };
        let decisions = vec![
            MemoryDecision::Store {
                content: "The port is 8443".into(),
                category: "fact".into(),
                importance: 0.7,
            },
            MemoryDecision::Discard {
                query: "old fact".into(),
            },
        ];
        let report = toolkit.execute(&decisions, &tools).await;
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(memory.stored.lock().unwrap().len(), 1);
        assert_eq!(memory.forgotten.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn execute_swallows_and_counts_failures() {
        let toolkit = MemoryToolkit::new();
        let memory = Arc::new(RecordingMemory {
            fail: true,
            ..Default::default()
        });
        let tools = ExternalTools {
            memory: Some(memory),
            ..Default::default()
        };
        let decisions = vec![MemoryDecision::Store {
            content: "x".into(),
            category: "fact".into(),
            importance: 0.5,
        }];
        let report = toolkit.execute(&decisions, &tools).await;
        assert_eq!(report.applied, 0);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn execute_without_memory_tool_skips() {
        let toolkit = MemoryToolkit::new();
        let decisions = vec![MemoryDecision::Discard { query: "x".into() }];
        let report = toolkit.execute(&decisions, &ExternalTools::default()).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 0);
    }
}
