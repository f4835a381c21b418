//! Weighted random choice over scored keys

use rand::prelude::*;
use std::collections::BTreeMap;

/// Samples keys with probability proportional to their min-max normalized score
///
/// Built once from a score map and reused until the scores change.
#[derive(Debug, Clone)]
pub struct WeightedChooser<K> {
    keys: Vec<K>,
    /// Running sum of normalized weights, same order as `keys`
    cumulative: Vec<f64>,
}

impl<K: Clone + Ord> WeightedChooser<K> {
    pub fn new(scores: &BTreeMap<K, f64>) -> Self {
        let weights = normalize(scores);
        let mut keys = Vec::with_capacity(weights.len());
        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        for (key, weight) in weights {
            total += weight;
            keys.push(key);
            cumulative.push(total);
        }
        Self { keys, cumulative }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Sample one key; uniform when every weight is zero
    pub fn choose<R: Rng>(&self, rng: &mut R) -> Option<&K> {
        if self.keys.is_empty() {
            return None;
        }
        let total = self.total_weight();
        if total <= 0.0 {
            return self.keys.get(rng.random_range(0..self.keys.len()));
        }
        let point = rng.random::<f64>() * total;
        let idx = self.cumulative.partition_point(|&c| c <= point);
        // point < total, but guard against rounding at the upper end
        self.keys.get(idx.min(self.keys.len() - 1))
    }
}

/// Linear min-max scaling to [0, 1]
///
/// An empty map or a degenerate range (all scores equal) yields 0 for every key.
pub fn normalize<K: Clone + Ord>(scores: &BTreeMap<K, f64>) -> BTreeMap<K, f64> {
    let min = scores.values().copied().fold(f64::INFINITY, f64::min);
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    scores
        .iter()
        .map(|(k, &v)| {
            let weight = if range > 0.0 && range.is_finite() {
                (v - min) / range
            } else {
                0.0
            };
            (k.clone(), weight)
        })
        .collect()
}
