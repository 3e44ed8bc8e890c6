//! Balanced discrete sampling.
//!
//! Candidates are stratified by an integer key (the z layer of the lattice). Each key receives
//! the same total probability, shared evenly among the candidates that carry it, so regions with
//! many nearby candidates do not dominate the draw.
use std::collections::BTreeMap;

use rand::Rng;

use crate::random::rand01;

#[derive(Debug, Clone)]
pub struct BalancedSampler {
    weights: Vec<f64>,
    total: f64,
}

impl BalancedSampler {
    pub fn new(keys: &[i64]) -> Self {
        let mut hist: BTreeMap<i64, usize> = BTreeMap::new();
        for k in keys {
            *hist.entry(*k).or_default() += 1;
        }
        let per_key = 1.0 / hist.len().max(1) as f64;
        let all = keys.len() as f64;
        let weights: Vec<f64> = keys
            .iter()
            .map(|k| per_key * all / hist[k] as f64)
            .collect();
        let total = weights.iter().sum();
        Self { weights, total }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Selection probability of every candidate, in input order.
    pub fn probabilities(&self) -> Vec<f64> {
        self.weights.iter().map(|w| w / self.total).collect()
    }

    /// Index of the drawn candidate, `None` when there are no candidates.
    pub fn sample(&self, rng: &mut dyn Rng) -> Option<usize> {
        if self.weights.is_empty() {
            return None;
        }
        let mut roll = rand01(rng) * self.total;
        for (i, w) in self.weights.iter().enumerate() {
            roll -= w;
            if roll < 0.0 {
                return Some(i);
            }
        }
        Some(self.weights.len() - 1)
    }
}
