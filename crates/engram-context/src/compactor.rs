// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool-output compaction before results re-enter the prompt.
//!
//! Five strategies chosen by a size ladder: passthrough, strip, truncate,
//! semantic extraction, and LLM summarisation. The LLM path falls back to
//! truncation on any error so a failing summarizer never breaks a prompt.

use engram_core::tokens::estimate_tokens;
use engram_core::{EngramError, SummarizerAdapter};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Size ladder thresholds, in estimated tokens.
#[derive(Debug, Clone)]
pub struct CompactorThresholds {
    /// At or below: pass through untouched.
    pub strip: u32,
    /// At or below: strip markup and noise.
    pub truncate: u32,
    /// At or below: truncate line-by-line.
    pub semantic: u32,
    /// At or below: semantic extraction; above: LLM summarisation.
    pub summarize: u32,
}

impl Default for CompactorThresholds {
    fn default() -> Self {
        Self {
            strip: 200,
            truncate: 500,
            semantic: 800,
            summarize: 1500,
        }
    }
}

/// Which strategy produced the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategy {
    Passthrough,
    Strip,
    Truncate,
    Semantic,
    Summarize,
}

/// Result of compacting one tool output.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub text: String,
    pub strategy: CompactionStrategy,
    pub original_tokens: u32,
    pub final_tokens: u32,
}

/// Compresses individual tool outputs before they re-enter the prompt.
#[derive(Debug, Clone, Default)]
pub struct OutputCompactor {
    thresholds: CompactorThresholds,
}

impl OutputCompactor {
    pub fn new(thresholds: CompactorThresholds) -> Self {
        Self { thresholds }
    }

    /// Compact `text`, choosing a strategy from the size ladder.
    ///
    /// The summarizer is only consulted above the semantic threshold; when
    /// it is absent or fails, the truncation strategy is used instead.
    pub async fn compact(
        &self,
        text: &str,
        summarizer: Option<&dyn SummarizerAdapter>,
    ) -> CompactionOutcome {
        let original_tokens = estimate_tokens(text);
        let t = &self.thresholds;

        let (candidate, strategy) = if original_tokens <= t.strip {
            (text.to_string(), CompactionStrategy::Passthrough)
        } else if original_tokens <= t.truncate {
            (strip_noise(text), CompactionStrategy::Strip)
        } else if original_tokens <= t.semantic {
            (
                truncate_lines(text, t.strip),
                CompactionStrategy::Truncate,
            )
        } else if original_tokens <= t.summarize {
            // Use the semantic rendering only when it beats truncation.
            let truncated = truncate_lines(text, t.strip);
            let semantic = semantic_extract(text);
            if estimate_tokens(&semantic) < estimate_tokens(&truncated) {
                (semantic, CompactionStrategy::Semantic)
            } else {
                (truncated, CompactionStrategy::Truncate)
            }
        } else {
            match self.summarize(text, summarizer).await {
                Ok(summary) => (summary, CompactionStrategy::Summarize),
                Err(e) => {
                    warn!(error = %e, "summarize compaction failed, falling back to truncation");
                    (
                        truncate_lines(text, t.strip),
                        CompactionStrategy::Truncate,
                    )
                }
            }
        };

        let final_tokens = estimate_tokens(&candidate);
        debug!(?strategy, original_tokens, final_tokens, "tool output compacted");
        CompactionOutcome {
            text: candidate,
            strategy,
            original_tokens,
            final_tokens,
        }
    }

    async fn summarize(
        &self,
        text: &str,
        summarizer: Option<&dyn SummarizerAdapter>,
    ) -> Result<String, EngramError> {
        let Some(summarizer) = summarizer else {
            return Err(EngramError::HostToolMissing {
                tool: "summarizer".into(),
            });
        };
        // Head and tail carry most of the signal in long tool outputs.
        let head: String = text.chars().take(2000).collect();
        let tail: String = {
            let chars: Vec<char> = text.chars().collect();
            let start = chars.len().saturating_sub(800);
            chars[start..].iter().collect()
        };
        let prompt = format!(
            "Compress this tool output into a short factual summary. Keep \
             numbers, identifiers, file paths, and error messages verbatim. \
             Output the summary only.\n\nStart of output:\n{head}\n\nEnd of output:\n{tail}"
        );
        summarizer.complete(&prompt, 512).await
    }
}

fn noise_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // HTML tags.
            Regex::new(r"</?[a-zA-Z][^>]*>").unwrap(),
            // Markdown image syntax.
            Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap(),
        ]
    })
}

fn noise_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(advertisement|sponsored|cookie consent|subscribe now|sign up for|^\s*(home|menu|navigation|footer)\s*$)",
        )
        .unwrap()
    })
}

/// Strip markup and boilerplate noise, collapse whitespace.
pub fn strip_noise(text: &str) -> String {
    let mut cleaned = text.to_string();
    for pattern in noise_patterns() {
        cleaned = pattern.replace_all(&cleaned, "").to_string();
    }
    let lines: Vec<&str> = cleaned
        .lines()
        .filter(|line| !noise_line_pattern().is_match(line))
        .collect();
    let joined = lines.join("\n");
    // Collapse runs of blank lines and trailing space.
    static BLANKS: OnceLock<Regex> = OnceLock::new();
    let blanks = BLANKS.get_or_init(|| Regex::new(r"\n{3,}").unwrap());
    blanks.replace_all(joined.trim(), "\n\n").to_string()
}

/// Keep whole lines until `max_tokens`, then append a visible marker.
pub fn truncate_lines(text: &str, max_tokens: u32) -> String {
    let total = estimate_tokens(text);
    let mut kept = String::new();
    let mut used = 0u32;
    for line in text.lines() {
        let cost = estimate_tokens(line) + 1;
        if used + cost > max_tokens {
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
        used += cost;
    }
    let omitted = total.saturating_sub(estimate_tokens(&kept));
    if omitted > 0 {
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(&format!("[truncated, {omitted} tokens omitted]"));
    }
    kept
}

/// Extract key facts, entities, actions, and numbers into a structured
/// multi-line summary.
pub fn semantic_extract(text: &str) -> String {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    static ACTION: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| {
        Regex::new(r"[$€£¥]?\d[\d,.]*\s*(%|ms|s|kb|mb|gb|元)?").unwrap()
    });
    let entity = ENTITY.get_or_init(|| {
        Regex::new(r"\b([A-Z][a-zA-Z0-9]+(?:\s[A-Z][a-zA-Z0-9]+)*|[a-z]+[A-Z][a-zA-Z]*|\S+\.(rs|py|ts|js|toml|json|md))\b").unwrap()
    });
    let action = ACTION.get_or_init(|| {
        Regex::new(r"(?i)\b(created|updated|deleted|failed|succeeded|installed|returned|fixed|error|warning)\b").unwrap()
    });

    let mut facts: Vec<String> = Vec::new();
    let mut entities: Vec<String> = Vec::new();
    let mut numbers: Vec<String> = Vec::new();

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let trimmed = line.trim();
        if action.is_match(trimmed) && facts.len() < 10 {
            let fact: String = trimmed.chars().take(160).collect();
            facts.push(fact);
        }
        for m in entity.find_iter(trimmed).take(3) {
            let e = m.as_str().to_string();
            if !entities.contains(&e) && entities.len() < 15 {
                entities.push(e);
            }
        }
        for m in number.find_iter(trimmed).take(3) {
            let n = m.as_str().trim().to_string();
            if n.len() > 1 && !numbers.contains(&n) && numbers.len() < 15 {
                numbers.push(n);
            }
        }
    }

    let mut out = String::from("[compacted tool output]\n");
    if !facts.is_empty() {
        out.push_str("Key events:\n");
        for f in &facts {
            out.push_str(&format!("- {f}\n"));
        }
    }
    if !entities.is_empty() {
        out.push_str(&format!("Entities: {}\n", entities.join(", ")));
    }
    if !numbers.is_empty() {
        out.push_str(&format!("Numbers: {}\n", numbers.join(", ")));
    }
    out
}
