//! Per-class analysis context
//!
//! One context owns every cache of one run: the class and method registries,
//! the CFG cache, the configuration and the seeded generator. Analyzing another
//! class means building another context.

use crate::cfg::{simplify, Cfg, CfgBuilder};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::{ClassModel, Expr};
use crate::nullability::ReturnOracle;
use crate::registry::{ClassRegistry, MethodRecord, MethodRegistry, Signature};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub struct AnalysisContext {
    pub(crate) classes: ClassRegistry,
    pub(crate) methods: MethodRegistry,
    pub(crate) config: AnalysisConfig,
    pub(crate) rng: ChaCha8Rng,
    /// `None` caches a body that could not be modeled
    cfgs: HashMap<Signature, Option<Rc<Cfg>>>,
    pub(crate) returns_in_progress: HashSet<Signature>,
    pub(crate) sites_in_progress: HashSet<Signature>,
}

impl AnalysisContext {
    pub fn new(model: ClassModel, config: AnalysisConfig) -> Self {
        let classes = ClassRegistry::register_class(model, config.matcher.build());
        let mut methods = MethodRegistry::new(config.weights.baseline);
        for (sig, exec) in classes.executables() {
            methods.entry(sig, exec.params.len());
        }
        Self {
            classes,
            methods,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            cfgs: HashMap::new(),
            returns_in_progress: HashSet::new(),
            sites_in_progress: HashSet::new(),
        }
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Record of a registered executable
    ///
    /// Every registered signature has a record from construction on.
    pub(crate) fn record_mut(&mut self, sig: &Signature) -> &mut MethodRecord {
        let params = self
            .classes
            .lookup_executable(sig.as_str())
            .map(|e| e.params.len())
            .unwrap_or(0);
        self.methods.entry(sig, params)
    }

    /// Simplified CFG of `sig`, built on first use
    pub fn cfg_of(&mut self, sig: &Signature) -> Option<Rc<Cfg>> {
        if let Some(cached) = self.cfgs.get(sig) {
            return cached.clone();
        }
        let built = match self.build_cfg(sig) {
            Ok(cfg) => Some(Rc::new(cfg)),
            Err(e) => {
                tracing::debug!(signature = %sig, error = %e, "no CFG");
                None
            }
        };
        self.cfgs.insert(sig.clone(), built.clone());
        built
    }

    /// Like [`cfg_of`](Self::cfg_of), with the reason when there is no graph
    pub fn require_cfg(&mut self, sig: &Signature) -> AnalysisResult<Rc<Cfg>> {
        self.cfg_of(sig)
            .ok_or_else(|| AnalysisError::model_gap(sig.as_str(), "no control flow graph"))
    }

    fn build_cfg(&self, sig: &Signature) -> AnalysisResult<Cfg> {
        let exec = self
            .classes
            .lookup_executable(sig.as_str())
            .ok_or_else(|| AnalysisError::model_gap(sig.as_str(), "not registered"))?;
        let body = exec
            .body
            .as_ref()
            .ok_or_else(|| AnalysisError::model_gap(sig.as_str(), "no body"))?;
        let raw = CfgBuilder::new()
            .with_max_depth(self.config.max_cfg_depth)
            .build(body)?;
        Ok(simplify(&raw))
    }
}

/// Answers return nullability of calls by analyzing in-scope callees on demand
pub(crate) struct ContextOracle<'c> {
    pub(crate) ctx: &'c mut AnalysisContext,
}

impl ReturnOracle for ContextOracle<'_> {
    fn call_may_return_null(&mut self, call: &Expr) -> bool {
        match self.ctx.classes.resolve_call(call) {
            Some(callee) => self.ctx.return_nullable(&callee),
            None => true,
        }
    }
}
