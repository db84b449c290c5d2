// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feedback tuner: adjusts the Stage-I coverage/relevance weight from
//! rated retrieval traces.

use tracing::debug;

use crate::types::{RetrievalTrace, Satisfaction};

/// Traces considered per tuning pass.
const TUNE_WINDOW: usize = 10;
/// Adjustment step per unsatisfied trace.
const ALPHA_STEP: f64 = 0.05;
/// Selected-fact count below which dissatisfaction reads as "needed
/// more coverage".
const COVERAGE_HUNGER: usize = 3;

pub const ALPHA_DEFAULT: f64 = 0.5;
pub const ALPHA_MIN: f64 = 0.2;
pub const ALPHA_MAX: f64 = 0.8;

/// Process-wide tuner state for the Stage-I α weight.
#[derive(Debug, Clone)]
pub struct FeedbackTuner {
    alpha: f64,
}

impl FeedbackTuner {
    pub fn new() -> Self {
        Self {
            alpha: ALPHA_DEFAULT,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Tune α over the last ten rated traces: an unsatisfied trace with
    /// few selected facts pushes toward coverage, one with plenty pushes
    /// toward relevance. Clamped to [0.2, 0.8].
    pub fn tune(&mut self, traces: &[RetrievalTrace]) -> f64 {
        let rated: Vec<&RetrievalTrace> = traces
            .iter()
            .filter(|t| t.satisfaction != Satisfaction::Unknown)
            .collect();
        for trace in rated.iter().rev().take(TUNE_WINDOW) {
            if trace.satisfaction != Satisfaction::Unsatisfied {
                continue;
            }
            if trace.fact_previews.len() < COVERAGE_HUNGER {
                self.alpha += ALPHA_STEP;
            } else {
                self.alpha -= ALPHA_STEP;
            }
        }
        self.alpha = self.alpha.clamp(ALPHA_MIN, ALPHA_MAX);
        debug!(alpha = self.alpha, "feedback tuner pass complete");
        self.alpha
    }
}

impl Default for FeedbackTuner {
    fn default() -> Self {
        Self::new()
    }
}
