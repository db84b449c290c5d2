// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Active retrieval: inspect the assistant's answer for uncertainty and,
//! when warranted, drive a memory → workspace → web search chain, with
//! cross-verification of web results before proposing new facts.

use engram_core::{EngramError, ExternalTools};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Hedge markers counted in the assistant output.
const HEDGE_MARKERS: &[&str] = &[
    "i think",
    "i believe",
    "i guess",
    "maybe",
    "perhaps",
    "probably",
    "possibly",
    "not sure",
    "might be",
    "around",
    "roughly",
    "可能",
    "不确定",
    "大概",
    "也许",
    "好像",
    "应该是",
];

/// Queries recalled for repeated-question detection.
const REPEAT_WINDOW: usize = 3;
/// Token-overlap fraction that marks a repeated question.
const REPEAT_OVERLAP: f64 = 0.60;
/// Fraction of answer key terms that must appear in web text.
const VERIFY_OVERLAP: f64 = 0.30;
/// Snippets proposed as new facts from a verified web result.
const MAX_PROPOSED_FACTS: usize = 3;

/// Uncertainty level of an assistant answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UncertaintyLevel {
    None,
    Low,
    Medium,
    High,
}

/// Assessed signal for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncertaintySignal {
    pub level: UncertaintyLevel,
    pub marker_count: usize,
    pub important_question: bool,
    pub repeated_question: bool,
}

impl UncertaintySignal {
    /// Whether the retrieval chain should run at all.
    pub fn warrants_retrieval(&self) -> bool {
        match self.level {
            UncertaintyLevel::None => false,
            UncertaintyLevel::Low => self.important_question,
            _ => true,
        }
    }

    /// Web search is reserved for medium and above.
    pub fn warrants_web(&self) -> bool {
        self.level >= UncertaintyLevel::Medium
    }
}

fn important_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| {
        Regex::new(
            r"(?i)(price|cost|how much|version|release|date|deadline|when\b|what is the|多少钱|价格|版本|什么时候|日期)",
        )
        .unwrap()
    })
}

/// Derive the uncertainty level from hedge markers, question importance,
/// and repetition against the recent query window.
pub fn assess_uncertainty(
    answer: &str,
    question: &str,
    recent_queries: &[String],
) -> UncertaintySignal {
    let lowered = answer.to_lowercase();
    let marker_count = HEDGE_MARKERS
        .iter()
        .filter(|marker| lowered.contains(*marker))
        .count();
    let important_question = important_pattern().is_match(question);
    let repeated_question = recent_queries
        .iter()
        .rev()
        .take(REPEAT_WINDOW)
        .any(|prev| token_overlap(question, prev) >= REPEAT_OVERLAP);

    let mut level = match marker_count {
        0 => UncertaintyLevel::None,
        1 if !important_question => UncertaintyLevel::Low,
        1 | 2 => UncertaintyLevel::Medium,
        _ => UncertaintyLevel::High,
    };
    if repeated_question && level < UncertaintyLevel::Medium {
        level = UncertaintyLevel::Medium;
    }

    UncertaintySignal {
        level,
        marker_count,
        important_question,
        repeated_question,
    }
}

/// Tokenize for overlap scoring: ASCII word runs plus individual CJK chars.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() && c.is_ascii() {
            current.push(c);
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            if engram_core::tokens::is_cjk(c) {
                tokens.push(c.to_string());
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Fraction of `a`'s tokens present in `b`.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    if tokens_a.is_empty() {
        return 0.0;
    }
    let tokens_b: std::collections::HashSet<String> = tokenize(b).into_iter().collect();
    let shared = tokens_a.iter().filter(|t| tokens_b.contains(*t)).count();
    shared as f64 / tokens_a.len() as f64
}

/// Which tool produced the chain's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalSource {
    None,
    Memory,
    Workspace,
    Web,
}

impl RetrievalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalSource::None => "none",
            RetrievalSource::Memory => "memory",
            RetrievalSource::Workspace => "workspace",
            RetrievalSource::Web => "web",
        }
    }
}

/// Outcome of one active-retrieval investigation.
#[derive(Debug, Clone)]
pub struct ActiveRetrievalOutcome {
    pub source: RetrievalSource,
    pub snippets: Vec<String>,
    /// Memory and workspace hits are trusted; web hits must pass
    /// cross-verification.
    pub verified: bool,
    /// Verified web snippets proposed for storage, at most three.
    pub proposed_facts: Vec<String>,
}

impl ActiveRetrievalOutcome {
    fn empty() -> Self {
        Self {
            source: RetrievalSource::None,
            snippets: vec![],
            verified: false,
            proposed_facts: vec![],
        }
    }
}

/// Drives the uncertainty-triggered retrieval chain.
pub struct ActiveRetriever {
    tools: ExternalTools,
}

impl ActiveRetriever {
    pub fn new(tools: ExternalTools) -> Self {
        Self { tools }
    }

    /// Run the chain, stopping at the first non-empty result. Per-turn
    /// limits: one memory call, one workspace call, one web call.
    pub async fn investigate(
        &self,
        signal: &UncertaintySignal,
        question: &str,
        answer: &str,
    ) -> Result<ActiveRetrievalOutcome, EngramError> {
        if !signal.warrants_retrieval() {
            return Ok(ActiveRetrievalOutcome::empty());
        }

        if let Some(memory) = &self.tools.memory {
            match memory.recall(question).await {
                Ok(hits) if !hits.is_empty() => {
                    debug!(hits = hits.len(), "active retrieval satisfied from memory");
                    return Ok(ActiveRetrievalOutcome {
                        source: RetrievalSource::Memory,
                        snippets: hits,
                        verified: true,
                        proposed_facts: vec![],
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "memory recall failed in active retrieval"),
            }
        }

        if let Some(workspace) = &self.tools.workspace {
            let pattern = key_terms(question).join("|");
            if !pattern.is_empty() {
                match workspace.grep(&pattern).await {
                    Ok(hits) if !hits.is_empty() => {
                        debug!(hits = hits.len(), "active retrieval satisfied from workspace");
                        return Ok(ActiveRetrievalOutcome {
                            source: RetrievalSource::Workspace,
                            snippets: hits,
                            verified: true,
                            proposed_facts: vec![],
                        });
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "workspace grep failed in active retrieval"),
                }
            }
        }

        if signal.warrants_web() {
            if let Some(web) = &self.tools.web {
                match web.search(question).await {
                    Ok(snippets) if !snippets.is_empty() => {
                        let verified = cross_verify(answer, &snippets);
                        let proposed_facts = if verified {
                            snippets
                                .iter()
                                .take(MAX_PROPOSED_FACTS)
                                .cloned()
                                .collect()
                        } else {
                            vec![]
                        };
                        return Ok(ActiveRetrievalOutcome {
                            source: RetrievalSource::Web,
                            snippets,
                            verified,
                            proposed_facts,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "web search failed in active retrieval"),
                }
            }
        }

        Ok(ActiveRetrievalOutcome::empty())
    }
}

/// Proper-noun and number tokens extracted from an answer for verification.
pub fn key_terms(text: &str) -> Vec<String> {
    static P: OnceLock<Regex> = OnceLock::new();
    let pattern = P.get_or_init(|| {
        Regex::new(r"(\$?\d[\d,.]*%?|v?\d+\.\d+(?:\.\d+)?|[A-Z][a-zA-Z0-9]+)").unwrap()
    });
    let mut terms = Vec::new();
    for m in pattern.find_iter(text) {
        let term = m.as_str().to_string();
        // Skip sentence-initial capitalised stop words.
        if term.len() < 2 {
            continue;
        }
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Require at least 30% of the answer's key terms to appear in the joined
/// web text before a web result counts as verified.
pub fn cross_verify(answer: &str, snippets: &[String]) -> bool {
    let terms = key_terms(answer);
    if terms.is_empty() {
        return false;
    }
    let joined = snippets.join("\n").to_lowercase();
    let present = terms
        .iter()
        .filter(|t| joined.contains(&t.to_lowercase()))
        .count();
    present as f64 / terms.len() as f64 >= VERIFY_OVERLAP
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engram_core::{MemoryTool, WebSearchTool, WorkspaceTool};
    use std::sync::Arc;

    struct FixedMemory(Vec<String>);
    #[async_trait]
    impl MemoryTool for FixedMemory {
        async fn recall(&self, _query: &str) -> Result<Vec<String>, EngramError> {
            Ok(self.0.clone())
        }
        async fn store(&self, _c: &str, _cat: &str, _i: f64) -> Result<(), EngramError> {
            Ok(())
        }
        async fn forget(&self, _query: &str) -> Result<(), EngramError> {
            Ok(())
        }
    }

    struct FixedWorkspace(Vec<String>);
    #[async_trait]
    impl WorkspaceTool for FixedWorkspace {
        async fn grep(&self, _pattern: &str) -> Result<Vec<String>, EngramError> {
            Ok(self.0.clone())
        }
    }

    struct FixedWeb(Vec<String>);
    #[async_trait]
    impl WebSearchTool for FixedWeb {
        async fn search(&self, _query: &str) -> Result<Vec<String>, EngramError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn zero_markers_is_none() {
        let signal = assess_uncertainty("It costs $50 per month.", "how much?", &[]);
        assert_eq!(signal.level, UncertaintyLevel::None);
        assert!(!signal.warrants_retrieval());
    }

    #[test]
    fn one_marker_unimportant_is_low() {
        let signal = assess_uncertainty(
            "I think the logo looks better in blue.",
            "which colour do you prefer?",
            &[],
        );
        assert_eq!(signal.level, UncertaintyLevel::Low);
        assert!(!signal.warrants_retrieval());
    }

    #[test]
    fn one_marker_important_is_medium() {
        let signal = assess_uncertainty(
            "I think it costs around $50",
            "how much does it cost?",
            &[],
        );
        // "i think" and "around" are both markers here; importance alone
        // already promotes a single marker to medium.
        assert!(signal.level >= UncertaintyLevel::Medium);
        assert!(signal.important_question);
        assert!(signal.warrants_web());
    }

    #[test]
    fn two_markers_is_medium() {
        let signal = assess_uncertainty(
            "Maybe, I believe the colour is configurable.",
            "can the colour change?",
            &[],
        );
        assert_eq!(signal.level, UncertaintyLevel::Medium);
    }

    #[test]
    fn many_markers_is_high() {
        let signal = assess_uncertainty(
            "I think it is maybe v2, perhaps v3, not sure.",
            "which version?",
            &[],
        );
        assert_eq!(signal.level, UncertaintyLevel::High);
    }

    #[test]
    fn chinese_markers_detected() {
        let signal = assess_uncertainty("可能是五十元，不确定。", "价格是多少", &[]);
        assert!(signal.level >= UncertaintyLevel::Medium);
    }

    #[test]
    fn repeated_question_promotes_to_medium() {
        let recent = vec!["how do I configure the linter".to_string()];
        let signal = assess_uncertainty(
            "I think you edit the config.",
            "how do I configure the linter properly",
            &recent,
        );
        assert!(signal.repeated_question);
        assert!(signal.level >= UncertaintyLevel::Medium);
    }

    #[test]
    fn repeat_window_only_last_three() {
        let recent: Vec<String> = vec![
            "how do I configure the linter".into(),
            "unrelated one".into(),
            "unrelated two".into(),
            "unrelated three".into(),
        ];
        let signal = assess_uncertainty(
            "I think you edit the config.",
            "how do I configure the linter",
            &recent,
        );
        assert!(!signal.repeated_question, "match is outside the window of 3");
    }

    #[test]
    fn token_overlap_cjk() {
        let overlap = token_overlap("产品价格是多少", "产品的价格");
        assert!(overlap > 0.5);
    }

    #[test]
    fn key_terms_extracts_numbers_and_nouns() {
        let terms = key_terms("The plan costs $50 per month on AWS with v2.3");
        assert!(terms.contains(&"$50".to_string()));
        assert!(terms.contains(&"AWS".to_string()));
        assert!(terms.contains(&"v2.3".to_string()));
    }

    #[test]
    fn cross_verify_threshold() {
        let answer = "I think it costs around $50";
        assert!(cross_verify(answer, &["Official pricing: $50 per month".to_string()]));
        assert!(!cross_verify(answer, &["no relevant content here".to_string()]));
        // No key terms at all: never verified.
        assert!(!cross_verify("it depends entirely", &["$50".to_string()]));
    }

    #[tokio::test]
    async fn chain_stops_at_memory() {
        let tools = ExternalTools {
            memory: Some(Arc::new(FixedMemory(vec!["stored answer".into()]))),
            workspace: Some(Arc::new(FixedWorkspace(vec!["workspace hit".into()]))),
            web: Some(Arc::new(FixedWeb(vec!["web hit".into()]))),
        };
        let retriever = ActiveRetriever::new(tools);
        let signal = assess_uncertainty("maybe, I think so", "what is the cost?", &[]);
        let outcome = retriever.investigate(&signal, "what is the cost?", "maybe").await.unwrap();
        assert_eq!(outcome.source, RetrievalSource::Memory);
        assert!(outcome.verified);
    }

    #[tokio::test]
    async fn chain_falls_through_to_web_and_verifies() {
        let tools = ExternalTools {
            memory: Some(Arc::new(FixedMemory(vec![]))),
            workspace: Some(Arc::new(FixedWorkspace(vec![]))),
            web: Some(Arc::new(FixedWeb(vec![
                "Official pricing: $50 per month".into(),
            ]))),
        };
        let retriever = ActiveRetriever::new(tools);
        let signal = assess_uncertainty(
            "I think it costs around $50",
            "how much does it cost?",
            &[],
        );
        assert_eq!(signal.level, UncertaintyLevel::Medium);
        assert!(signal.important_question);

        let outcome = retriever
            .investigate(&signal, "how much does it cost?", "I think it costs around $50")
            .await
            .unwrap();
        assert_eq!(outcome.source, RetrievalSource::Web);
        assert!(outcome.verified, "$50 appears in the web text");
        assert_eq!(outcome.proposed_facts.len(), 1);
    }

    #[tokio::test]
    async fn unverified_web_result_proposes_nothing() {
        let tools = ExternalTools {
            web: Some(Arc::new(FixedWeb(vec!["totally unrelated page".into()]))),
            ..Default::default()
        };
        let retriever = ActiveRetriever::new(tools);
        let signal = assess_uncertainty(
            "I think it costs around $50",
            "how much does it cost?",
            &[],
        );
        let outcome = retriever
            .investigate(&signal, "how much does it cost?", "I think it costs around $50")
            .await
            .unwrap();
        assert_eq!(outcome.source, RetrievalSource::Web);
        assert!(!outcome.verified);
        assert!(outcome.proposed_facts.is_empty());
    }

    #[tokio::test]
    async fn low_level_skips_web() {
        let tools = ExternalTools {
            web: Some(Arc::new(FixedWeb(vec!["anything".into()]))),
            ..Default::default()
        };
        let retriever = ActiveRetriever::new(tools);
        // One marker, unimportant question -> low, skip entirely.
        let signal = assess_uncertainty("I think blue.", "which colour?", &[]);
        let outcome = retriever.investigate(&signal, "which colour?", "I think blue.").await.unwrap();
        assert_eq!(outcome.source, RetrievalSource::None);
    }

    #[tokio::test]
    async fn absent_tools_degrade_gracefully() {
        let retriever = ActiveRetriever::new(ExternalTools::default());
        let signal = assess_uncertainty(
            "maybe around $10, not sure",
            "what is the price?",
            &[],
        );
        let outcome = retriever.investigate(&signal, "q", "a").await.unwrap();
        assert_eq!(outcome.source, RetrievalSource::None);
        assert!(outcome.snippets.is_empty());
    }
}
