// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Online tail sampler backing the distribution-aware split/merge gates.
//!
//! Records observations into a bounded window and answers "is this value
//! in the upper tail of what we've seen?". Below a minimum observation
//! count the answer is `None` and callers fall back to fixed bounds.

/// Bounded online sampler with sorted snapshots.
#[derive(Debug, Clone)]
pub struct TailSampler {
    samples: Vec<f64>,
    capacity: usize,
    min_observations: usize,
    /// Next slot to overwrite once the window is full.
    cursor: usize,
}

impl TailSampler {
    /// Sampler with a 256-observation window and the given warm-up count.
    pub fn new(min_observations: usize) -> Self {
        Self {
            samples: Vec::new(),
            capacity: 256,
            min_observations,
            cursor: 0,
        }
    }

    /// Record one observation, overwriting the oldest once full.
    pub fn record(&mut self, value: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            self.samples[self.cursor] = value;
            self.cursor = (self.cursor + 1) % self.capacity;
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Value at quantile `q` over a sorted snapshot, or `None` during
    /// warm-up.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.samples.len() < self.min_observations {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((sorted.len() as f64 - 1.0) * q.clamp(0.0, 1.0)).round() as usize;
        Some(sorted[idx])
    }

    /// Whether `value` sits in the upper `tail` fraction of observations.
    ///
    /// `None` during warm-up; callers must fall back to a fixed bound.
    pub fn in_upper_tail(&self, value: f64, tail: f64) -> Option<bool> {
        let threshold = self.quantile(1.0 - tail)?;
        Some(value >= threshold)
    }
}
