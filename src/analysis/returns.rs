//! Return nullability of executables in the target class

use crate::analysis::context::{AnalysisContext, ContextOracle};
use crate::cfg::{def_use_paths, return_nodes};
use crate::model::visit::{may_be_null_literal, walk_stmts};
use crate::model::StmtKind;
use crate::nullability::{PropagationQuery, Propagator};
use crate::registry::{MethodState, Signature};

impl AnalysisContext {
    /// Whether `sig` may return null, computed once and memoized
    ///
    /// Unknown executables, bodiless ones and callees already being analyzed
    /// up the stack all answer `true`.
    pub fn return_nullable(&mut self, sig: &Signature) -> bool {
        if let Some(known) = self.methods.get(sig.as_str()).and_then(|r| r.return_nullable) {
            return known;
        }
        if self.returns_in_progress.contains(sig) {
            tracing::debug!(signature = %sig, "analysis cycle, assuming nullable return");
            return true;
        }

        self.returns_in_progress.insert(sig.clone());
        let nullable = self.compute_return_nullable(sig);
        self.returns_in_progress.remove(sig);

        if self.classes.lookup_executable(sig.as_str()).is_some() {
            let record = self.record_mut(sig);
            record.return_nullable = Some(nullable);
            record.advance(MethodState::ReturnNullabilityComputed);
        }
        nullable
    }

    fn compute_return_nullable(&mut self, sig: &Signature) -> bool {
        let Some(exec) = self.classes.lookup_executable(sig.as_str()) else {
            return true;
        };
        if exec.is_constructor() || exec.return_type.is_primitive() {
            return false;
        }
        let Some(body) = &exec.body else {
            return true;
        };

        let mut literal_null = false;
        walk_stmts(&body.stmts, &mut |stmt| {
            if let StmtKind::Return { value: Some(value) } = &stmt.kind {
                literal_null |= may_be_null_literal(value);
            }
        });
        if literal_null {
            tracing::trace!(signature = %sig, "returns a null literal");
            return true;
        }

        let seed = {
            let params = self
                .methods
                .get(sig.as_str())
                .map(|r| r.nullable_params.clone())
                .unwrap_or_default();
            Propagator::seed(&params, self.classes.field_table())
        };
        let Some(cfg) = self.cfg_of(sig) else {
            return true;
        };
        let limits = self.config.limits.clone();
        let propagator = Propagator::new(&cfg);
        let mut oracle = ContextOracle { ctx: self };

        for node in return_nodes(&cfg) {
            let paths = def_use_paths(&cfg, node, None, &limits);
            if paths.is_empty() {
                return true;
            }
            for path in &paths {
                if propagator
                    .propagate(path, &seed, PropagationQuery::ReturnValue, &mut oracle)
                    .nullable
                {
                    return true;
                }
            }
        }
        false
    }
}
