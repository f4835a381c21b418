//! Analysis state machine over one target class
//!
//! `Setup → FieldNullability → ConstructorFlow → MethodAnalysis → Scoring → Done`
//!
//! Failures inside one executable are logged and skip that executable; they
//! never abort the run.

use crate::analysis::context::AnalysisContext;
use crate::analysis::influence::influential_params;
use crate::analysis::score::compute_scores;
use crate::cfg::{find_node_by_id, reachable_nodes_backward, NodeKind};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::visit::collect_literals;
use crate::model::{ClassModel, Literal, VarId};
use crate::nullability::{analyze_literals, classify_fields, FieldNullability, FieldTable, NullArgument};
use crate::registry::{CandidateSite, MethodRecord, Signature};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPhase {
    Setup,
    FieldNullability,
    ConstructorFlow,
    MethodAnalysis,
    Scoring,
    Done,
}

/// Drives one [`AnalysisContext`] through the analysis phases and answers
/// the queries of the test generator
pub struct Analyzer {
    ctx: AnalysisContext,
    phase: AnalysisPhase,
}

impl Analyzer {
    pub fn new(model: ClassModel, config: AnalysisConfig) -> Self {
        Self {
            ctx: AnalysisContext::new(model, config),
            phase: AnalysisPhase::Setup,
        }
    }

    pub fn phase(&self) -> AnalysisPhase {
        self.phase
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut AnalysisContext {
        &mut self.ctx
    }

    /// Run every remaining phase; a finished analyzer is left unchanged
    pub fn run(&mut self) {
        while self.phase != AnalysisPhase::Done {
            self.step();
        }
    }

    /// Run one phase and move to the next
    pub fn step(&mut self) {
        let next = match self.phase {
            AnalysisPhase::Setup => AnalysisPhase::FieldNullability,
            AnalysisPhase::FieldNullability => {
                self.classify_fields();
                AnalysisPhase::ConstructorFlow
            }
            AnalysisPhase::ConstructorFlow => {
                self.constructor_flow();
                AnalysisPhase::MethodAnalysis
            }
            AnalysisPhase::MethodAnalysis => {
                self.method_analysis();
                AnalysisPhase::Scoring
            }
            AnalysisPhase::Scoring => {
                self.rescore();
                AnalysisPhase::Done
            }
            AnalysisPhase::Done => AnalysisPhase::Done,
        };
        tracing::debug!(from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;
    }

    fn classify_fields(&mut self) {
        let table = classify_fields(self.ctx.classes.model());
        tracing::debug!(
            class = self.ctx.classes.name(),
            nullable = table.nullable_fields().len(),
            "fields classified"
        );
        self.ctx.classes.set_field_table(table);
    }

    fn constructor_flow(&mut self) {
        let constructors: Vec<Signature> = self.ctx.classes.constructors().map(|(s, _)| s.clone()).collect();
        for sig in constructors {
            if let Err(e) = self.record_influence(&sig) {
                tracing::warn!(signature = %sig, category = e.category(), error = %e, "constructor flow skipped");
            }
        }
    }

    fn record_influence(&mut self, sig: &Signature) -> AnalysisResult<()> {
        let cfg = self.ctx.require_cfg(sig)?;
        let exec = self
            .ctx
            .classes
            .lookup_executable(sig.as_str())
            .ok_or_else(|| AnalysisError::model_gap(sig.as_str(), "not registered"))?;
        let params = influential_params(&cfg, exec, &self.ctx.config.limits);
        self.ctx.record_mut(sig).influential_params = params;
        Ok(())
    }

    fn method_analysis(&mut self) {
        self.seed_literal_facts();
        let signatures: Vec<Signature> = self.ctx.classes.signatures().cloned().collect();
        for sig in signatures {
            if let Err(e) = self.analyze_executable(&sig) {
                tracing::warn!(signature = %sig, category = e.category(), error = %e, "executable skipped");
            }
        }
    }

    /// Null-literal summaries, then null arguments flagged on their callees
    fn seed_literal_facts(&mut self) {
        let mut null_args: Vec<NullArgument> = Vec::new();
        let summaries: Vec<_> = self
            .ctx
            .classes
            .executables()
            .map(|(sig, exec)| (sig.clone(), analyze_literals(exec)))
            .collect();

        for (sig, summary) in summaries {
            null_args.extend(summary.null_arguments.iter().cloned());
            let record = self.ctx.record_mut(&sig);
            record.nullable_params.extend(summary.nullable_params.iter().cloned());
            record.literals = summary;
        }

        // One call deep only, and only into this class
        for arg in null_args {
            let Some(target) = self.ctx.classes.resolve_scoped(
                &arg.callee,
                arg.owner.as_deref(),
                arg.receiver_type.as_deref(),
            ) else {
                continue;
            };
            let Some(param) = self
                .ctx
                .classes
                .lookup_executable(target.as_str())
                .and_then(|e| e.params.get(arg.index))
                .map(|p| p.name.clone())
            else {
                continue;
            };
            tracing::trace!(callee = %target, param = %param, "null argument flags parameter");
            self.ctx.record_mut(&target).nullable_params.insert(param);
        }
    }

    #[tracing::instrument(skip(self, sig), fields(signature = %sig))]
    fn analyze_executable(&mut self, sig: &Signature) -> AnalysisResult<()> {
        let ctx = &mut self.ctx;
        ctx.complexity(sig);
        ctx.return_nullable(sig);

        let cfg = ctx.require_cfg(sig)?;
        ctx.ensure_sites(sig);

        let mut read_fields = BTreeSet::new();
        let mut write_fields = BTreeSet::new();
        for node in cfg.node_weights() {
            read_fields.extend(node.reads().into_iter().filter_map(field_name));
            write_fields.extend(node.writes().into_iter().filter_map(field_name));
        }

        let exec = ctx
            .classes
            .lookup_executable(sig.as_str())
            .ok_or_else(|| AnalysisError::model_gap(sig.as_str(), "not registered"))?;
        let is_constructor = exec.is_constructor();
        let visible = exec.visibility.is_target_visible();
        let influence = if is_constructor {
            None
        } else {
            Some(influential_params(&cfg, exec, &ctx.config.limits))
        };
        let eligible = !is_constructor || ctx.config.constructors_as_targets;

        let record = ctx.record_mut(sig);
        record.read_fields = read_fields;
        record.write_fields = write_fields;
        if let Some(params) = influence {
            record.influential_params = params;
        }
        record.is_target = eligible && visible && record.has_sites();
        tracing::debug!(
            sites = record.sites.len(),
            target = record.is_target,
            "executable analyzed"
        );
        Ok(())
    }

    fn rescore(&mut self) {
        let scores = compute_scores(
            &self.ctx.methods,
            self.ctx.classes.found_npe_lines(),
            &self.ctx.config.weights,
        );
        self.ctx.methods.set_scores(scores);
    }

    /// Public and protected methods with at least one candidate site
    pub fn target_methods(&self) -> BTreeSet<Signature> {
        self.ctx.methods.target_methods()
    }

    pub fn candidate_sites(&self, signature: &str) -> &[CandidateSite] {
        self.record(signature).map(|r| r.sites.as_slice()).unwrap_or(&[])
    }

    /// Score of `signature`; the baseline when unknown
    pub fn score(&self, signature: &str) -> f64 {
        match self.ctx.classes.resolve(signature) {
            Some(sig) => self.ctx.methods.score(sig.as_str()),
            None => self.ctx.methods.baseline(),
        }
    }

    /// Weighted random target method
    pub fn choose_target_method(&mut self) -> Option<Signature> {
        self.ctx.methods.choose_target(&mut self.ctx.rng)
    }

    /// Unknown or unanalyzed signatures answer `true`
    pub fn is_return_nullable(&self, signature: &str) -> bool {
        self.record(signature)
            .and_then(|r| r.return_nullable)
            .unwrap_or(true)
    }

    pub fn field_nullability(&self, name: &str) -> FieldNullability {
        self.ctx.classes.field_table().get(name)
    }

    pub fn field_table(&self) -> &FieldTable {
        self.ctx.classes.field_table()
    }

    /// Non-null literals of statements that can execute before a candidate
    /// site of `signature`
    ///
    /// The test generator seeds its constant pool with these.
    pub fn seed_literals(&mut self, signature: &str) -> Vec<Literal> {
        let Some(sig) = self.ctx.classes.resolve(signature) else {
            return Vec::new();
        };
        let Some(cfg) = self.ctx.cfg_of(&sig) else {
            return Vec::new();
        };
        let site_nodes: BTreeSet<usize> = self.candidate_sites(sig.as_str()).iter().map(|s| s.node).collect();

        let mut literals = Vec::new();
        for id in site_nodes {
            let Some(site) = find_node_by_id(&cfg, id) else {
                tracing::debug!(signature = %sig, node = id, "site node missing from CFG");
                continue;
            };
            let mut nodes = reachable_nodes_backward(&cfg, site);
            nodes.insert(site);
            // Branch conditions do not contribute
            for n in nodes.into_iter().filter(|&n| cfg[n].kind == NodeKind::Statement) {
                let Some(code) = &cfg[n].code else { continue };
                for expr in code.exprs() {
                    collect_literals(expr, &mut literals);
                }
            }
        }
        literals.retain(|l| !matches!(l, Literal::Null));
        literals
    }

    /// Feedback from the generator: an NPE was observed at `line`
    ///
    /// Sites on that line stop contributing, scores are recomputed and the
    /// chooser is rebuilt on next use.
    pub fn record_discovered_npe(&mut self, line: u32) {
        if !self.ctx.classes.mark_npe_found(line) {
            return;
        }
        tracing::info!(line, "NPE observed, rescoring");
        if self.phase == AnalysisPhase::Done {
            self.rescore();
        }
    }

    /// Uniformly sample one parameter index whose value reaches a field write
    pub fn choose_influential_param(&mut self, signature: &str) -> Option<usize> {
        let sig = self.ctx.classes.resolve(signature)?;
        let params: Vec<usize> = self
            .ctx
            .methods
            .get(sig.as_str())?
            .influential_params
            .iter()
            .copied()
            .collect();
        if params.is_empty() {
            return None;
        }
        params.get(self.ctx.rng.random_range(0..params.len())).copied()
    }

    /// Serializable summary of the whole run
    pub fn report(&self) -> AnalysisReport {
        let methods = self
            .ctx
            .methods
            .records()
            .map(|record| MethodReport {
                score: self.ctx.methods.score(record.signature.as_str()),
                record: record.clone(),
            })
            .collect();
        AnalysisReport {
            class: self.ctx.classes.name().to_string(),
            phase: self.phase,
            fields: self.ctx.classes.field_table().clone(),
            targets: self.target_methods().into_iter().collect(),
            found_npe_lines: self.ctx.classes.found_npe_lines().iter().copied().collect(),
            methods,
        }
    }

    fn record(&self, signature: &str) -> Option<&MethodRecord> {
        let sig = self.ctx.classes.resolve(signature)?;
        self.ctx.methods.get(sig.as_str())
    }
}

fn field_name(var: VarId) -> Option<String> {
    match var {
        VarId::Field(name) => Some(name),
        VarId::Param(_) | VarId::Local(_) => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub class: String,
    pub phase: AnalysisPhase,
    pub fields: FieldTable,
    pub targets: Vec<Signature>,
    pub found_npe_lines: Vec<u32>,
    pub methods: Vec<MethodReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodReport {
    #[serde(flatten)]
    pub record: MethodRecord,
    pub score: f64,
}
