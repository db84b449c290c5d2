// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Priority-tier token allocator for the final prompt injection.
//!
//! Items are tagged with one of five tiers; each tier gets a ratio of the
//! total budget and tiers are filled in priority order. Identity is never
//! trimmed; everything below it trims line-by-line or drops.

use engram_core::tokens::estimate_tokens;
use tracing::debug;

/// Minimum leftover tokens worth spending on a trimmed item.
const TRIM_MIN_REMAINDER: u32 = 50;

/// Coarse priority class determining which items are trimmed first
/// under token pressure. Order is allocation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BudgetTier {
    Identity,
    Workspace,
    Memory,
    Tools,
    Extras,
}

impl BudgetTier {
    /// Share of the total budget reserved for this tier.
    pub fn ratio(&self) -> f64 {
        match self {
            BudgetTier::Identity => 0.10,
            BudgetTier::Workspace => 0.35,
            BudgetTier::Memory => 0.30,
            BudgetTier::Tools => 0.15,
            BudgetTier::Extras => 0.10,
        }
    }

    /// All tiers in allocation priority order.
    pub fn all() -> [BudgetTier; 5] {
        [
            BudgetTier::Identity,
            BudgetTier::Workspace,
            BudgetTier::Memory,
            BudgetTier::Tools,
            BudgetTier::Extras,
        ]
    }

    /// Label for reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetTier::Identity => "identity",
            BudgetTier::Workspace => "workspace",
            BudgetTier::Memory => "memory",
            BudgetTier::Tools => "tools",
            BudgetTier::Extras => "extras",
        }
    }
}

/// A candidate item for the prompt injection.
#[derive(Debug, Clone)]
pub struct BudgetItem {
    pub tier: BudgetTier,
    pub label: String,
    pub content: String,
}

impl BudgetItem {
    pub fn new(tier: BudgetTier, label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tier,
            label: label.into(),
            content: content.into(),
        }
    }
}

/// An admitted item with its final content and token cost.
#[derive(Debug, Clone)]
pub struct AllocatedItem {
    pub tier: BudgetTier,
    pub label: String,
    pub content: String,
    pub tokens: u32,
    pub trimmed: bool,
}

/// Result of an allocation pass.
#[derive(Debug, Clone)]
pub struct BudgetReport {
    pub items: Vec<AllocatedItem>,
    /// Sum of admitted token costs; never exceeds the total budget.
    pub total_used: u32,
    /// Tokens saved versus admitting everything untouched.
    pub savings: u32,
}

/// Priority-tier token allocator.
#[derive(Debug, Clone)]
pub struct BudgetManager {
    total_budget: u32,
}

impl BudgetManager {
    /// Allocator over the default 4,000-token global budget.
    pub fn new() -> Self {
        Self { total_budget: 4000 }
    }

    /// Allocator with an explicit total budget.
    pub fn with_total(total_budget: u32) -> Self {
        Self { total_budget }
    }

    pub fn total_budget(&self) -> u32 {
        self.total_budget
    }

    /// Allocate items tier by tier in priority order.
    ///
    /// Within a tier, items are admitted in input order until the tier
    /// budget is reached; the next item is trimmed line-by-line when at
    /// least [`TRIM_MIN_REMAINDER`] tokens remain, and dropped otherwise.
    /// Identity items are always admitted untrimmed. If rounding pushes
    /// the sum past the total, lower tiers are trimmed first.
    pub fn allocate(&self, items: Vec<BudgetItem>) -> BudgetReport {
        let original_total: u32 = items.iter().map(|i| estimate_tokens(&i.content)).sum();
        let mut allocated: Vec<AllocatedItem> = Vec::new();

        for tier in BudgetTier::all() {
            let tier_budget = (self.total_budget as f64 * tier.ratio()).floor() as u32;
            let mut used_in_tier = 0u32;

            for item in items.iter().filter(|i| i.tier == tier) {
                let cost = estimate_tokens(&item.content);

                if tier == BudgetTier::Identity {
                    // Identity is never trimmed, even past its tier share.
                    allocated.push(AllocatedItem {
                        tier,
                        label: item.label.clone(),
                        content: item.content.clone(),
                        tokens: cost,
                        trimmed: false,
                    });
                    used_in_tier += cost;
                    continue;
                }

                let remaining = tier_budget.saturating_sub(used_in_tier);
                if cost <= remaining {
                    allocated.push(AllocatedItem {
                        tier,
                        label: item.label.clone(),
                        content: item.content.clone(),
                        tokens: cost,
                        trimmed: false,
                    });
                    used_in_tier += cost;
                } else if remaining >= TRIM_MIN_REMAINDER {
                    if let Some((content, tokens)) = trim_to_budget(&item.content, remaining) {
                        allocated.push(AllocatedItem {
                            tier,
                            label: item.label.clone(),
                            content,
                            tokens,
                            trimmed: true,
                        });
                        used_in_tier += tokens;
                    }
                }
                // Otherwise dropped.
            }
        }

        // Rounding or oversized identity items can still push past the
        // total; recover by trimming from the lowest tier upward.
        let mut total_used: u32 = allocated.iter().map(|i| i.tokens).sum();
        if total_used > self.total_budget {
            let mut overshoot = total_used - self.total_budget;
            for tier in BudgetTier::all().iter().rev() {
                if overshoot == 0 {
                    break;
                }
                if *tier == BudgetTier::Identity {
                    break;
                }
                // Drop this tier's items from the back.
                while overshoot > 0 {
                    let Some(pos) = allocated.iter().rposition(|i| i.tier == *tier) else {
                        break;
                    };
                    let item = allocated.remove(pos);
                    if item.tokens > overshoot {
                        let keep = item.tokens - overshoot;
                        if keep >= TRIM_MIN_REMAINDER {
                            if let Some((content, tokens)) = trim_to_budget(&item.content, keep) {
                                overshoot = overshoot.saturating_sub(item.tokens - tokens);
                                allocated.insert(
                                    pos,
                                    AllocatedItem {
                                        trimmed: true,
                                        content,
                                        tokens,
                                        ..item
                                    },
                                );
                                continue;
                            }
                        }
                    }
                    overshoot = overshoot.saturating_sub(item.tokens);
                }
            }
            total_used = allocated.iter().map(|i| i.tokens).sum();
        }

        debug!(
            total_used,
            total_budget = self.total_budget,
            items = allocated.len(),
            "budget allocation complete"
        );

        BudgetReport {
            savings: original_total.saturating_sub(total_used),
            items: allocated,
            total_used,
        }
    }
}

impl Default for BudgetManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim content line-by-line (boundary-respecting) to fit `budget` tokens.
///
/// Returns `None` when not even the first line fits.
fn trim_to_budget(content: &str, budget: u32) -> Option<(String, u32)> {
    let mut kept = String::new();
    let mut used = 0u32;
    for line in content.lines() {
        let line_cost = estimate_tokens(line) + 1; // newline overhead
        if used + line_cost > budget {
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
        used += line_cost;
    }
    if kept.is_empty() {
        return None;
    }
    Some((kept.clone(), estimate_tokens(&kept)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of_tokens(tokens: usize) -> String {
        // ~4 ASCII chars per token, split across lines of 10 tokens.
        let line = "abcdefgh ".repeat(10); // ~90 chars -> ~23 tokens
        let mut out = String::new();
        while estimate_tokens(&out) < tokens as u32 {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    #[test]
    fn tier_ratios_sum_to_one() {
        let sum: f64 = BudgetTier::all().iter().map(|t| t.ratio()).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn allocation_never_exceeds_total() {
        let manager = BudgetManager::with_total(500);
        let items = vec![
            BudgetItem::new(BudgetTier::Identity, "profile", text_of_tokens(50)),
            BudgetItem::new(BudgetTier::Workspace, "w1", text_of_tokens(400)),
            BudgetItem::new(BudgetTier::Workspace, "w2", text_of_tokens(400)),
            BudgetItem::new(BudgetTier::Workspace, "w3", text_of_tokens(400)),
        ];
        let report = manager.allocate(items);
        assert!(
            report.total_used <= 500,
            "total {} exceeds budget",
            report.total_used
        );
        let sum: u32 = report.items.iter().map(|i| i.tokens).sum();
        assert_eq!(sum, report.total_used);
    }

    #[test]
    fn identity_kept_intact_under_overflow() {
        let manager = BudgetManager::with_total(500);
        let identity = text_of_tokens(50);
        let items = vec![
            BudgetItem::new(BudgetTier::Identity, "profile", identity.clone()),
            BudgetItem::new(BudgetTier::Workspace, "w1", text_of_tokens(400)),
            BudgetItem::new(BudgetTier::Workspace, "w2", text_of_tokens(400)),
            BudgetItem::new(BudgetTier::Workspace, "w3", text_of_tokens(400)),
        ];
        let report = manager.allocate(items);

        let kept_identity = report
            .items
            .iter()
            .find(|i| i.tier == BudgetTier::Identity)
            .expect("identity item must survive");
        assert!(!kept_identity.trimmed);
        assert_eq!(kept_identity.content, identity);
        assert!(report.total_used <= 500);
    }

    #[test]
    fn items_within_tier_budget_pass_untrimmed() {
        let manager = BudgetManager::with_total(4000);
        // Workspace tier budget = 1400.
        let items = vec![
            BudgetItem::new(BudgetTier::Workspace, "a", text_of_tokens(300)),
            BudgetItem::new(BudgetTier::Workspace, "b", text_of_tokens(300)),
        ];
        let report = manager.allocate(items);
        assert_eq!(report.items.len(), 2);
        assert!(report.items.iter().all(|i| !i.trimmed));
    }

    #[test]
    fn next_item_trimmed_when_remainder_sufficient() {
        let manager = BudgetManager::with_total(1000);
        // Memory tier budget = 300.
        let items = vec![
            BudgetItem::new(BudgetTier::Memory, "a", text_of_tokens(200)),
            BudgetItem::new(BudgetTier::Memory, "b", text_of_tokens(300)),
        ];
        let report = manager.allocate(items);
        assert_eq!(report.items.len(), 2);
        assert!(!report.items[0].trimmed);
        assert!(report.items[1].trimmed, "second item should be line-trimmed");
        assert!(report.items[1].tokens < 300);
    }

    #[test]
    fn item_dropped_when_remainder_too_small() {
        let manager = BudgetManager::with_total(1000);
        // Tools tier budget = 150.
        let items = vec![
            BudgetItem::new(BudgetTier::Tools, "a", text_of_tokens(130)),
            BudgetItem::new(BudgetTier::Tools, "b", text_of_tokens(200)),
        ];
        let report = manager.allocate(items);
        // Remainder after "a" is < 50, so "b" is dropped entirely.
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].label, "a");
    }

    #[test]
    fn savings_accounts_for_dropped_content() {
        let manager = BudgetManager::with_total(500);
        let items = vec![
            BudgetItem::new(BudgetTier::Extras, "x", text_of_tokens(400)),
        ];
        let report = manager.allocate(items);
        assert!(report.savings > 0);
    }

    #[test]
    fn empty_input_is_empty_report() {
        let report = BudgetManager::new().allocate(vec![]);
        assert!(report.items.is_empty());
        assert_eq!(report.total_used, 0);
        assert_eq!(report.savings, 0);
    }

    #[test]
    fn trim_respects_line_boundaries() {
        let content = "line one is here\nline two is here\nline three is here";
        let (trimmed, _) = trim_to_budget(content, 8).unwrap();
        assert!(trimmed.starts_with("line one"));
        // No partial lines.
        for line in trimmed.lines() {
            assert!(content.lines().any(|l| l == line));
        }
    }

    #[test]
    fn trim_nothing_fits_returns_none() {
        let content = "a single very long line ".repeat(40);
        assert!(trim_to_budget(&content, 10).is_none());
    }
}
