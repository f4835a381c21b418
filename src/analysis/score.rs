//! Composite priority score per method
//!
//! ```text
//! base(m)  = complexity^a * max(1, params)^b * npe_paths^g
//! final(m) = base(m) + sum over in-scope call sites s of
//!            w * final(callee(s)) / max_base * path_count(s)
//! ```
//!
//! `npe_paths` sums the path counts of sites that are not calls into the
//! class. Sites on lines where an NPE was already observed are ignored. A
//! final score of zero is lifted to the baseline so every method stays
//! selectable.

use crate::registry::{MethodRecord, MethodRegistry, Signature, DEFAULT_BASELINE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub complexity_exponent: f64,
    pub param_exponent: f64,
    pub path_exponent: f64,
    pub inner_call_weight: f64,
    pub baseline: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            complexity_exponent: 1.0,
            param_exponent: 1.0,
            path_exponent: 1.0,
            inner_call_weight: 1.0,
            baseline: DEFAULT_BASELINE,
        }
    }
}

/// Score every method of `methods` from scratch
pub fn compute_scores(
    methods: &MethodRegistry,
    found_lines: &BTreeSet<u32>,
    weights: &ScoreWeights,
) -> BTreeMap<Signature, f64> {
    let base: BTreeMap<&str, f64> = methods
        .records()
        .map(|r| (r.signature.as_str(), base_score(r, found_lines, weights)))
        .collect();
    let max_base = base.values().copied().fold(0.0, f64::max);

    let mut scorer = Scorer {
        methods,
        found_lines,
        weights,
        base: &base,
        max_base,
        memo: BTreeMap::new(),
        in_progress: HashSet::new(),
    };

    methods
        .records()
        .map(|r| {
            let score = scorer.final_score(r);
            let score = if score > 0.0 { score } else { weights.baseline };
            (r.signature.clone(), score)
        })
        .collect()
}

/// Complexity, parameter and path factors of one method
pub fn base_score(record: &MethodRecord, found_lines: &BTreeSet<u32>, weights: &ScoreWeights) -> f64 {
    let npe_paths: usize = record
        .sites
        .iter()
        .filter(|s| !s.is_inner_call() && !found_lines.contains(&s.line))
        .map(|s| s.path_count)
        .sum();
    if npe_paths == 0 {
        return 0.0;
    }
    let complexity = f64::from(record.complexity.max(1));
    let params = record.param_count.max(1) as f64;
    complexity.powf(weights.complexity_exponent)
        * params.powf(weights.param_exponent)
        * (npe_paths as f64).powf(weights.path_exponent)
}

struct Scorer<'a> {
    methods: &'a MethodRegistry,
    found_lines: &'a BTreeSet<u32>,
    weights: &'a ScoreWeights,
    base: &'a BTreeMap<&'a str, f64>,
    max_base: f64,
    memo: BTreeMap<Signature, f64>,
    in_progress: HashSet<Signature>,
}

impl Scorer<'_> {
    fn final_score(&mut self, record: &MethodRecord) -> f64 {
        if let Some(&score) = self.memo.get(&record.signature) {
            return score;
        }
        // Recursive call chains contribute nothing the second time round
        if !self.in_progress.insert(record.signature.clone()) {
            return 0.0;
        }

        let methods = self.methods;
        let mut score = self.base.get(record.signature.as_str()).copied().unwrap_or(0.0);
        if self.max_base > 0.0 {
            for site in &record.sites {
                let Some(callee) = &site.callee else { continue };
                if self.found_lines.contains(&site.line) {
                    continue;
                }
                let Some(callee_record) = methods.get(callee.as_str()) else {
                    continue;
                };
                let inner = self.final_score(callee_record);
                score += self.weights.inner_call_weight * (inner / self.max_base) * site.path_count as f64;
            }
        }

        self.in_progress.remove(&record.signature);
        self.memo.insert(record.signature.clone(), score);
        score
    }
}
