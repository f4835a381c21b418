//! Per-method analysis state and scores

use crate::cfg::NodeId;
use crate::model::StmtId;
use crate::nullability::{FactMap, NullLiteralSummary};
use crate::registry::{Signature, WeightedChooser};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// Score of methods with no recorded score
pub const DEFAULT_BASELINE: f64 = 0.1;

/// Progress of one method through the pipeline
///
/// States only move forward; re-entering an earlier state is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodState {
    #[default]
    Unanalyzed,
    ComplexityComputed,
    ReturnNullabilityComputed,
    SitesCollected,
    Scored,
}

/// Statement node that may dereference null
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSite {
    /// Stable CFG node id
    pub node: NodeId,
    pub stmt: Option<StmtId>,
    pub line: u32,
    /// Paths on which the dereferenced value may be null
    pub path_count: usize,
    /// In-scope callee when the site is a call into the class
    pub callee: Option<Signature>,
    pub description: String,
}

impl CandidateSite {
    pub fn is_inner_call(&self) -> bool {
        self.callee.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodRecord {
    pub signature: Signature,
    pub state: MethodState,
    pub complexity: u32,
    pub param_count: usize,
    pub return_nullable: Option<bool>,
    pub sites: Vec<CandidateSite>,
    /// Parameter indices whose value flows into a field write
    pub influential_params: BTreeSet<usize>,
    pub read_fields: BTreeSet<String>,
    pub write_fields: BTreeSet<String>,
    /// Facts merged over every propagated path
    #[serde(skip)]
    pub facts: FactMap,
    pub literals: NullLiteralSummary,
    /// Parameters that receive a null argument somewhere in the class
    pub nullable_params: BTreeSet<String>,
    pub is_target: bool,
}

impl MethodRecord {
    pub fn new(signature: Signature, param_count: usize) -> Self {
        Self {
            signature,
            state: MethodState::Unanalyzed,
            complexity: 0,
            param_count,
            return_nullable: None,
            sites: Vec::new(),
            influential_params: BTreeSet::new(),
            read_fields: BTreeSet::new(),
            write_fields: BTreeSet::new(),
            facts: FactMap::new(),
            literals: NullLiteralSummary::default(),
            nullable_params: BTreeSet::new(),
            is_target: false,
        }
    }

    /// Move to `state` if it is later than the current one
    pub fn advance(&mut self, state: MethodState) {
        if state > self.state {
            self.state = state;
        }
    }

    pub fn reached(&self, state: MethodState) -> bool {
        self.state >= state
    }

    pub fn has_sites(&self) -> bool {
        !self.sites.is_empty()
    }

    pub fn site_lines(&self) -> BTreeSet<u32> {
        self.sites.iter().map(|s| s.line).collect()
    }
}

/// Records, scores and the target chooser of one analysis run
#[derive(Debug)]
pub struct MethodRegistry {
    records: BTreeMap<Signature, MethodRecord>,
    scores: BTreeMap<Signature, f64>,
    baseline: f64,
    chooser: RefCell<Option<WeightedChooser<Signature>>>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE)
    }
}

impl MethodRegistry {
    pub fn new(baseline: f64) -> Self {
        Self {
            records: BTreeMap::new(),
            scores: BTreeMap::new(),
            baseline,
            chooser: RefCell::new(None),
        }
    }

    /// Record for `signature`, created on first use
    pub fn entry(&mut self, signature: &Signature, param_count: usize) -> &mut MethodRecord {
        self.records
            .entry(signature.clone())
            .or_insert_with(|| MethodRecord::new(signature.clone(), param_count))
    }

    pub fn get(&self, signature: &str) -> Option<&MethodRecord> {
        self.records.get(signature)
    }

    pub fn get_mut(&mut self, signature: &str) -> Option<&mut MethodRecord> {
        self.records.get_mut(signature)
    }

    pub fn records(&self) -> impl Iterator<Item = &MethodRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replace all scores; the chooser is rebuilt on next use
    pub fn set_scores(&mut self, scores: BTreeMap<Signature, f64>) {
        for (sig, _) in scores.iter() {
            if let Some(record) = self.records.get_mut(sig) {
                record.advance(MethodState::Scored);
            }
        }
        self.scores = scores;
        self.invalidate_chooser();
    }

    /// Recorded score, or the baseline when absent
    pub fn score(&self, signature: &str) -> f64 {
        self.scores.get(signature).copied().unwrap_or(self.baseline)
    }

    pub fn scores(&self) -> &BTreeMap<Signature, f64> {
        &self.scores
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn target_methods(&self) -> BTreeSet<Signature> {
        self.records
            .values()
            .filter(|r| r.is_target)
            .map(|r| r.signature.clone())
            .collect()
    }

    pub fn invalidate_chooser(&self) {
        self.chooser.replace(None);
    }

    /// Sample a target method proportionally to its score
    pub fn choose_target<R: rand::Rng>(&self, rng: &mut R) -> Option<Signature> {
        let mut cached = self.chooser.borrow_mut();
        let chooser = cached.get_or_insert_with(|| {
            let target_scores: BTreeMap<Signature, f64> = self
                .target_methods()
                .into_iter()
                .map(|sig| {
                    let score = self.score(sig.as_str());
                    (sig, score)
                })
                .collect();
            tracing::debug!("rebuilding target chooser");
            WeightedChooser::new(&target_scores)
        });
        chooser.choose(rng).cloned()
    }
}
