//! NPE candidate site detection and path counting

use crate::analysis::context::{AnalysisContext, ContextOracle};
use crate::analysis::cyclomatic_complexity;
use crate::cfg::export::render_expr;
use crate::cfg::{def_use_paths, statement_nodes, Cfg, NodeCode};
use crate::model::visit::walk_expr;
use crate::model::{Expr, ExprKind, StmtKind};
use crate::nullability::{merge_facts, FactMap, FieldTable, PropagationQuery, Propagator};
use crate::registry::{CandidateSite, ClassRegistry, MethodState, Signature};
use petgraph::graph::NodeIndex;
use std::collections::BTreeSet;

/// Dereference found at one node, before path counting
#[derive(Debug, Clone, PartialEq)]
struct Dereference {
    callee: Option<Signature>,
    description: String,
}

impl AnalysisContext {
    /// Complexity of `sig`, computed once
    pub fn complexity(&mut self, sig: &Signature) -> u32 {
        if let Some(record) = self.methods.get(sig.as_str()) {
            if record.reached(MethodState::ComplexityComputed) {
                return record.complexity;
            }
        }
        let Some(complexity) = self
            .classes
            .lookup_executable(sig.as_str())
            .map(cyclomatic_complexity)
        else {
            return 1;
        };
        let record = self.record_mut(sig);
        record.complexity = complexity;
        record.advance(MethodState::ComplexityComputed);
        complexity
    }

    /// Collect the candidate sites of `sig` once; true if it has any
    ///
    /// A callee whose collection is still in progress up the stack counts as
    /// having sites.
    pub fn ensure_sites(&mut self, sig: &Signature) -> bool {
        if let Some(record) = self.methods.get(sig.as_str()) {
            if record.reached(MethodState::SitesCollected) {
                return record.has_sites();
            }
        }
        if self.sites_in_progress.contains(sig) {
            tracing::debug!(signature = %sig, "site collection cycle, assuming sites");
            return true;
        }
        if self.classes.lookup_executable(sig.as_str()).is_none() {
            return false;
        }

        self.sites_in_progress.insert(sig.clone());
        let (sites, facts) = self.collect_sites(sig);
        self.sites_in_progress.remove(sig);

        let lines: BTreeSet<u32> = sites.iter().map(|s| s.line).collect();
        self.classes.record_npe_lines(sig, lines);
        let record = self.record_mut(sig);
        let has_sites = !sites.is_empty();
        record.sites = sites;
        merge_facts(&mut record.facts, &facts);
        record.advance(MethodState::SitesCollected);
        has_sites
    }

    fn collect_sites(&mut self, sig: &Signature) -> (Vec<CandidateSite>, FactMap) {
        let mut facts = FactMap::new();
        let Some(cfg) = self.cfg_of(sig) else {
            return (Vec::new(), facts);
        };
        let complexity = self.complexity(sig);

        let mut sites = Vec::new();
        for node in statement_nodes(&cfg) {
            let derefs = self.dereferences(&cfg, node);
            if derefs.is_empty() {
                continue;
            }

            let path_count = if complexity <= self.config.complexity_path_cutoff {
                self.count_nullable_paths(sig, &cfg, node, &mut facts)
            } else {
                (complexity / 2) as usize
            };
            if path_count == 0 {
                tracing::trace!(signature = %sig, node = cfg[node].id, "no nullable path, site dropped");
                continue;
            }

            for deref in derefs {
                sites.push(CandidateSite {
                    node: cfg[node].id,
                    stmt: cfg[node].stmt,
                    line: cfg[node].line_or_zero(),
                    path_count,
                    callee: deref.callee,
                    description: deref.description,
                });
            }
        }

        tracing::debug!(signature = %sig, sites = sites.len(), "candidate sites collected");
        (sites, facts)
    }

    /// Propagate along every def-use path from `node`; count the nullable ones
    fn count_nullable_paths(&mut self, sig: &Signature, cfg: &Cfg, node: NodeIndex, facts: &mut FactMap) -> usize {
        let seed = {
            let params = self
                .methods
                .get(sig.as_str())
                .map(|r| r.nullable_params.clone())
                .unwrap_or_default();
            Propagator::seed(&params, self.classes.field_table())
        };
        let paths = def_use_paths(cfg, node, None, &self.config.limits);
        let propagator = Propagator::new(cfg);
        let mut oracle = ContextOracle { ctx: self };

        let mut count = 0;
        for path in &paths {
            let result = propagator.propagate(path, &seed, PropagationQuery::CandidateSite, &mut oracle);
            merge_facts(facts, &result.facts);
            if result.nullable {
                count += 1;
            }
        }
        count
    }

    /// Dereferences evaluated at `node`, one per distinct callee
    fn dereferences(&mut self, cfg: &Cfg, node: NodeIndex) -> Vec<Dereference> {
        let Some(code) = &cfg[node].code else {
            return Vec::new();
        };

        let mut receivers: Vec<&Expr> = Vec::new();
        let mut self_calls: Vec<&Expr> = Vec::new();
        match code {
            NodeCode::Iterate(iterable) => receivers.push(iterable),
            NodeCode::Stmt(stmt) => {
                if let StmtKind::Throw { value } = &stmt.kind {
                    receivers.push(value);
                }
            }
            NodeCode::Condition(_) | NodeCode::Bind { .. } => {}
        }
        for root in code.exprs() {
            walk_expr(root, &mut |e| match &e.kind {
                ExprKind::Invoke { receiver, method, owner, .. } => {
                    if is_library_call(method, owner.as_deref()) {
                        return;
                    }
                    match receiver {
                        Some(r) if !matches!(r.kind, ExprKind::This) => receivers.push(r),
                        _ => self_calls.push(e),
                    }
                }
                ExprKind::Field { receiver: Some(r), .. } if !matches!(r.kind, ExprKind::This) => {
                    receivers.push(r)
                }
                ExprKind::ArrayAccess { array, .. } => receivers.push(array),
                _ => {}
            });
        }

        let mut derefs: Vec<Dereference> = Vec::new();
        let fields = self.classes.field_table();
        if let Some(r) = receivers
            .iter()
            .find(|r| receiver_may_be_null(r, fields, &self.classes))
        {
            derefs.push(Dereference {
                callee: None,
                description: render_expr(r),
            });
        }

        for call in self_calls {
            let Some(callee) = self.classes.resolve_call(call) else {
                // Inherited or super method: the implicit receiver is still dereferenced
                if !derefs.iter().any(|d| d.callee.is_none()) {
                    derefs.push(Dereference {
                        callee: None,
                        description: render_expr(call),
                    });
                }
                continue;
            };
            if derefs.iter().any(|d| d.callee.as_ref() == Some(&callee)) {
                continue;
            }
            if self.ensure_sites(&callee) {
                derefs.push(Dereference {
                    description: format!("call to {}", callee),
                    callee: Some(callee),
                });
            }
        }
        derefs
    }
}

/// Calls into `java.util` never count as dereference sites
fn is_library_call(method: &str, owner: Option<&str>) -> bool {
    method.starts_with("java.util.") || owner.is_some_and(|o| o.starts_with("java.util."))
}

/// Whether dereferencing `receiver` may throw
fn receiver_may_be_null(receiver: &Expr, fields: &FieldTable, class: &ClassRegistry) -> bool {
    if receiver.ty.is_primitive() {
        return false;
    }
    match &receiver.kind {
        ExprKind::Cast { operand } => receiver_may_be_null(operand, fields, class),
        ExprKind::Literal { value } => matches!(value, crate::model::Literal::Null),
        ExprKind::This
        | ExprKind::TypeAccess { .. }
        | ExprKind::New { .. }
        | ExprKind::NewArray { .. }
        | ExprKind::Lambda
        // String concatenation
        | ExprKind::Binary { .. } => false,
        ExprKind::Field { receiver: own, name }
            if own.as_ref().map_or(true, |r| matches!(r.kind, ExprKind::This)) && class.field(name).is_some() =>
        {
            !fields.is_provably_non_null(name)
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::AnalysisContext;
    use crate::config::AnalysisConfig;
    use crate::model::build::*;
    use crate::model::{BinaryOp, ClassModel, Expr, TypeRef, Visibility};
    use crate::nullability::classify_fields;
    use crate::registry::Signature;

    fn obj() -> TypeRef {
        TypeRef::object("Foo")
    }

    fn foo_on(receiver: Expr) -> Expr {
        call_on(receiver, "foo()", TypeRef::Void)
    }

    fn context(model: ClassModel) -> AnalysisContext {
        let fields = classify_fields(&model);
        let mut ctx = AnalysisContext::new(model, AnalysisConfig::default());
        ctx.classes.set_field_table(fields);
        ctx
    }

    fn sites_of(ctx: &mut AnalysisContext, sig: &str) -> Vec<(u32, usize, Option<String>)> {
        let sig = Signature::new(sig);
        ctx.ensure_sites(&sig);
        ctx.methods()
            .get(sig.as_str())
            .unwrap()
            .sites
            .iter()
            .map(|s| (s.line, s.path_count, s.callee.as_ref().map(|c| c.to_string())))
            .collect()
    }

    #[test]
    fn test_unguarded_parameter_dereference() {
        let model = class("pkg.C")
            .executable(
                method("m", Visibility::Public)
                    .param("p", obj())
                    .body(vec![expr_stmt(1, foo_on(param_ref("p", obj())))])
                    .build(),
            )
            .build();
        let mut ctx = context(model);
        assert_eq!(sites_of(&mut ctx, "pkg.C.m(Foo)"), vec![(1, 1, None)]);
    }

    #[test]
    fn test_excluded_receivers() {
        let concat = binary(BinaryOp::Add, str_lit("a"), local_ref("s", TypeRef::string()), TypeRef::string());
        let model = class("pkg.C")
            .executable(
                method("m", Visibility::Public)
                    .body(vec![
                        expr_stmt(1, foo_on(new_object("Foo", vec![]))),
                        expr_stmt(2, foo_on(str_lit("lit"))),
                        expr_stmt(3, foo_on(type_access("Math"))),
                        expr_stmt(4, foo_on(concat)),
                        expr_stmt(5, foo_on(this_ref("pkg.C"))),
                        expr_stmt(6, foo_on(cast(new_object("Foo", vec![]), obj()))),
                    ])
                    .build(),
            )
            .build();
        let mut ctx = context(model);
        assert!(sites_of(&mut ctx, "pkg.C.m()").is_empty());
    }

    #[test]
    fn test_guarded_dereference_is_dropped() {
        // Foo x = null; if (x != null) x.foo();
        let model = class("pkg.C")
            .executable(
                method("m", Visibility::Public)
                    .body(vec![
                        local_decl(1, "x", obj(), Some(null())),
                        if_stmt(2, ne(local_ref("x", obj()), null()), vec![expr_stmt(3, foo_on(local_ref("x", obj())))], None),
                    ])
                    .build(),
            )
            .build();
        let mut ctx = context(model);
        assert!(sites_of(&mut ctx, "pkg.C.m()").is_empty());
    }

    #[test]
    fn test_provably_non_null_field_excluded() {
        let model = class("pkg.C")
            .field_init("safe", obj(), new_object("Foo", vec![]))
            .field("risky", obj())
            .executable(
                method("m", Visibility::Public)
                    .body(vec![
                        expr_stmt(1, foo_on(field_ref("safe", obj()))),
                        expr_stmt(2, foo_on(field_of(this_ref("pkg.C"), "risky", obj()))),
                    ])
                    .build(),
            )
            .build();
        let mut ctx = context(model);
        let sites = sites_of(&mut ctx, "pkg.C.m()");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].0, 2);
    }

    #[test]
    fn test_java_util_calls_excluded() {
        let list = TypeRef::object("java.util.List");
        let model = class("pkg.C")
            .executable(
                method("m", Visibility::Public)
                    .param("xs", list.clone())
                    .body(vec![expr_stmt(
                        1,
                        with_owner(call_on(param_ref("xs", list), "size()", TypeRef::int()), "java.util.List"),
                    )])
                    .build(),
            )
            .build();
        let mut ctx = context(model);
        assert!(sites_of(&mut ctx, "pkg.C.m(java.util.List)").is_empty());
    }

    #[test]
    fn test_self_call_is_site_when_callee_has_sites() {
        let model = class("pkg.C")
            .field("risky", obj())
            .executable(
                method("inner", Visibility::Private)
                    .body(vec![expr_stmt(1, foo_on(field_ref("risky", obj())))])
                    .build(),
            )
            .executable(method("quiet", Visibility::Private).body(vec![ret(2, None)]).build())
            .executable(
                method("outer", Visibility::Public)
                    .body(vec![
                        expr_stmt(3, call_self("inner()", vec![], TypeRef::Void)),
                        expr_stmt(4, call_self("quiet()", vec![], TypeRef::Void)),
                    ])
                    .build(),
            )
            .build();
        let mut ctx = context(model);
        let sites = sites_of(&mut ctx, "pkg.C.outer()");
        assert_eq!(sites, vec![(3, 1, Some("pkg.C.inner()".to_string()))]);
    }

    #[test]
    fn test_self_call_outside_class_is_plain_site() {
        let model = class("pkg.C")
            .executable(
                method("m", Visibility::Public)
                    .body(vec![
                        expr_stmt(1, call_self("inherited()", vec![], TypeRef::Void)),
                        expr_stmt(2, with_owner(call_self("close()", vec![], TypeRef::Void), "pkg.Base")),
                    ])
                    .build(),
            )
            .build();
        let mut ctx = context(model);
        assert_eq!(sites_of(&mut ctx, "pkg.C.m()"), vec![(1, 1, None), (2, 1, None)]);
    }

    #[test]
    fn test_mutual_recursion_counts_in_progress_as_sites() {
        let model = class("pkg.C")
            .executable(
                method("a", Visibility::Public)
                    .body(vec![expr_stmt(1, call_self("b()", vec![], TypeRef::Void))])
                    .build(),
            )
            .executable(
                method("b", Visibility::Public)
                    .body(vec![expr_stmt(2, call_self("a()", vec![], TypeRef::Void))])
                    .build(),
            )
            .build();
        let mut ctx = context(model);
        assert_eq!(sites_of(&mut ctx, "pkg.C.a()").len(), 1);
        assert_eq!(sites_of(&mut ctx, "pkg.C.b()").len(), 1);
    }

    #[test]
    fn test_for_each_iterable_and_throw_operand() {
        let model = class("pkg.C")
            .executable(
                method("m", Visibility::Public)
                    .param("xs", TypeRef::object("java.lang.Iterable"))
                    .param("e", TypeRef::object("java.lang.RuntimeException"))
                    .body(vec![
                        for_each(1, "x", obj(), param_ref("xs", TypeRef::object("java.lang.Iterable")), vec![]),
                        throw(2, param_ref("e", TypeRef::object("java.lang.RuntimeException"))),
                    ])
                    .build(),
            )
            .build();
        let mut ctx = context(model);
        let lines: Vec<u32> = sites_of(&mut ctx, "pkg.C.m(java.lang.Iterable,java.lang.RuntimeException)")
            .into_iter()
            .map(|s| s.0)
            .collect();
        assert_eq!(lines, vec![1, 2]);
    }

    #[test]
    fn test_complex_methods_estimate_path_counts() {
        let flag = || local_ref("c", TypeRef::boolean());
        let mut body: Vec<_> = (0..16)
            .map(|i| if_stmt(10 + i, flag(), vec![], None))
            .collect();
        body.push(expr_stmt(99, foo_on(param_ref("p", obj()))));
        let model = class("pkg.C")
            .executable(method("m", Visibility::Public).param("p", obj()).body(body).build())
            .build();
        let mut ctx = context(model);
        // complexity 17 exceeds the cutoff: 17 / 2 paths per site
        assert_eq!(sites_of(&mut ctx, "pkg.C.m(Foo)"), vec![(99, 8, None)]);
    }
}
