// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observability: a bounded ring of retrieval traces with implicit
//! satisfaction marking, feeding the feedback tuner.

use std::collections::VecDeque;

use crate::types::{RetrievalTrace, Satisfaction};

/// Ring capacity.
pub const TRACE_RING_CAPACITY: usize = 100;

/// A follow-up query inside this window marks the previous trace
/// unsatisfied (the user asked again).
const UNSATISFIED_WINDOW_MS: i64 = 60_000;

/// Aggregate view over the ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservabilityReport {
    pub traces: usize,
    /// Fraction of traces that selected at least one fact.
    pub hit_rate: f64,
    pub avg_tokens: f64,
    /// Satisfied fraction among rated traces.
    pub satisfaction_rate: f64,
}

/// Bounded trace buffer; writes happen only on the hook path.
#[derive(Debug, Default)]
pub struct ObservabilityRing {
    traces: VecDeque<RetrievalTrace>,
}

impl ObservabilityRing {
    pub fn new() -> Self {
        Self {
            traces: VecDeque::new(),
        }
    }

    /// Record a trace, rating the previous one by the gap to this query:
    /// a follow-up within sixty seconds means the last bundle did not
    /// satisfy, anything slower counts as satisfied.
    pub fn record(&mut self, trace: RetrievalTrace) {
        if let Some(prev) = self.traces.back_mut() {
            if prev.satisfaction == Satisfaction::Unknown {
                prev.satisfaction =
                    if trace.timestamp - prev.timestamp < UNSATISFIED_WINDOW_MS {
                        Satisfaction::Unsatisfied
                    } else {
                        Satisfaction::Satisfied
                    };
            }
        }
        if self.traces.len() >= TRACE_RING_CAPACITY {
            self.traces.pop_front();
        }
        self.traces.push_back(trace);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Most recent traces, oldest first.
    pub fn snapshot(&self) -> Vec<RetrievalTrace> {
        self.traces.iter().cloned().collect()
    }

    pub fn report(&self) -> ObservabilityReport {
        let total = self.traces.len();
        if total == 0 {
            return ObservabilityReport {
                traces: 0,
                hit_rate: 0.0,
                avg_tokens: 0.0,
                satisfaction_rate: 0.0,
            };
        }
        let hits = self
            .traces
            .iter()
            .filter(|t| !t.fact_previews.is_empty())
            .count();
        let tokens: u64 = self.traces.iter().map(|t| t.tokens as u64).sum();
        let rated: Vec<&RetrievalTrace> = self
            .traces
            .iter()
            .filter(|t| t.satisfaction != Satisfaction::Unknown)
            .collect();
        let satisfied = rated
            .iter()
            .filter(|t| t.satisfaction == Satisfaction::Satisfied)
            .count();
        ObservabilityReport {
            traces: total,
            hit_rate: hits as f64 / total as f64,
            avg_tokens: tokens as f64 / total as f64,
            satisfaction_rate: if rated.is_empty() {
                0.0
            } else {
                satisfied as f64 / rated.len() as f64
            },
        }
    }
}
