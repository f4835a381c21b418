//! Forward nullability simulation along one enumerated path
//!
//! Facts map each tracked variable to `true` (may be null) or `false`
//! (non-null). A variable without a fact is treated as possibly null.

use crate::cfg::{Cfg, EdgeType, NodeCode, NodeKind, Path};
use crate::model::visit::{is_null_typed, null_comparison, var_of, walk_expr, written_var};
use crate::model::{Expr, ExprKind, StmtKind, VarId};
use crate::nullability::FieldTable;
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use std::collections::BTreeMap;

/// Variable identity to "may be null"
pub type FactMap = BTreeMap<VarId, bool>;

/// OR-merge `other` into `into`
pub fn merge_facts(into: &mut FactMap, other: &FactMap) {
    for (var, &nullable) in other {
        let entry = into.entry(var.clone()).or_insert(false);
        *entry |= nullable;
    }
}

/// Answers whether a call may return null
///
/// Callees outside the target class, and callees whose analysis is still in
/// progress, must answer `true`.
pub trait ReturnOracle {
    fn call_may_return_null(&mut self, call: &Expr) -> bool;
}

impl<F> ReturnOracle for F
where
    F: FnMut(&Expr) -> bool,
{
    fn call_may_return_null(&mut self, call: &Expr) -> bool {
        self(call)
    }
}

/// What is evaluated at the start node of the path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationQuery {
    /// Is any variable read at the site possibly null
    CandidateSite,
    /// Is the returned expression possibly null
    ReturnValue,
}

/// Result of one pass
#[derive(Debug, Clone, PartialEq)]
pub struct Propagation {
    pub nullable: bool,
    /// Facts after the whole path, start node included
    pub facts: FactMap,
}

pub struct Propagator<'a> {
    cfg: &'a Cfg,
}

impl<'a> Propagator<'a> {
    pub fn new(cfg: &'a Cfg) -> Self {
        Self { cfg }
    }

    /// Initial facts: flagged parameters nullable, provably non-null fields not
    pub fn seed<'p>(nullable_params: impl IntoIterator<Item = &'p String>, fields: &FieldTable) -> FactMap {
        let mut facts = FactMap::new();
        for name in fields.provably_non_null_fields() {
            facts.insert(VarId::Field(name.to_string()), false);
        }
        for name in nullable_params {
            facts.insert(VarId::Param(name.clone()), true);
        }
        facts
    }

    /// Walk `path` in execution order and evaluate `query` at its start node
    pub fn propagate(
        &self,
        path: &Path,
        seed: &FactMap,
        query: PropagationQuery,
        oracle: &mut dyn ReturnOracle,
    ) -> Propagation {
        let mut facts = seed.clone();
        let forward: Vec<NodeIndex> = path.forward().collect();
        let Some((&start, before)) = forward.split_last() else {
            return Propagation { nullable: true, facts };
        };

        for (i, &node) in before.iter().enumerate() {
            self.transfer(node, &mut facts, oracle);
            let next = forward.get(i + 1).map(|&n| self.cfg[n].kind);
            self.refine(node, next, &mut facts);
        }

        let nullable = self.evaluate(start, &facts, query, oracle);
        self.transfer(start, &mut facts, oracle);
        Propagation { nullable, facts }
    }

    fn evaluate(&self, start: NodeIndex, facts: &FactMap, query: PropagationQuery, oracle: &mut dyn ReturnOracle) -> bool {
        let node = &self.cfg[start];
        if query == PropagationQuery::ReturnValue {
            if let Some(StmtKind::Return { value: Some(value) }) = node.code.as_ref().and_then(NodeCode::as_stmt).map(|s| &s.kind) {
                return eval(value, facts, oracle);
            }
        }
        let reads = node.reads();
        if reads.is_empty() {
            return true;
        }
        reads.iter().any(|v| facts.get(v).copied().unwrap_or(true))
    }

    /// Apply the definitions made by one node
    fn transfer(&self, node: NodeIndex, facts: &mut FactMap, oracle: &mut dyn ReturnOracle) {
        let Some(code) = &self.cfg[node].code else {
            return;
        };

        // Assignments nested in expressions run before the enclosing statement
        for expr in code.exprs() {
            apply_nested_assignments(expr, facts, oracle);
        }

        match code {
            NodeCode::Stmt(stmt) => match &stmt.kind {
                StmtKind::Local { name, ty, init } => {
                    if ty.is_primitive() {
                        return;
                    }
                    let nullable = match init {
                        Some(e) => eval(e, facts, oracle),
                        None => true,
                    };
                    facts.insert(VarId::Local(name.clone()), nullable);
                }
                StmtKind::Assign { target, value } => apply_assign(target, value, facts, oracle),
                _ => {}
            },
            NodeCode::Bind { var, ty } => {
                if ty.is_primitive() {
                    return;
                }
                // Catch parameters are never null; for-each elements may be
                let caught = self
                    .cfg
                    .edges_directed(node, Direction::Incoming)
                    .any(|e| e.weight().kind == EdgeType::Exception);
                facts.insert(VarId::Local(var.clone()), !caught);
            }
            NodeCode::Condition(_) | NodeCode::Iterate(_) => {}
        }
    }

    /// Narrow a null-checked variable on the branch taken next
    fn refine(&self, node: NodeIndex, next: Option<NodeKind>, facts: &mut FactMap) {
        let Some(NodeCode::Condition(cond)) = &self.cfg[node].code else {
            return;
        };
        let Some((var, is_eq)) = null_comparison(cond) else {
            return;
        };
        let taken_true = match next {
            Some(NodeKind::TrueBranch) => true,
            Some(NodeKind::FalseBranch) => false,
            _ => return,
        };
        tracing::trace!(var = %var, taken_true, "refining on null check");
        facts.insert(var, is_eq == taken_true);
    }
}

fn apply_assign(target: &Expr, value: &Expr, facts: &mut FactMap, oracle: &mut dyn ReturnOracle) {
    if target.ty.is_primitive() || value.ty.is_primitive() {
        return;
    }
    if matches!(target.kind, ExprKind::ArrayAccess { .. }) {
        tracing::debug!("array element write leaves array nullability unchanged");
        return;
    }
    match written_var(target) {
        Some(var) => {
            let nullable = eval(value, facts, oracle);
            facts.insert(var, nullable);
        }
        None => tracing::debug!(?target.kind, "unmodelled assignment target skipped"),
    }
}

fn apply_nested_assignments(expr: &Expr, facts: &mut FactMap, oracle: &mut dyn ReturnOracle) {
    let mut nested: Vec<(&Expr, &Expr)> = Vec::new();
    walk_expr(expr, &mut |e| {
        if let ExprKind::Assign { target, value } = &e.kind {
            nested.push((&**target, &**value));
        }
    });
    // Inner assignments complete first
    for (target, value) in nested.into_iter().rev() {
        apply_assign(target, value, facts, oracle);
    }
}

/// Whether `expr` may evaluate to null under `facts`
fn eval(expr: &Expr, facts: &FactMap, oracle: &mut dyn ReturnOracle) -> bool {
    if is_null_typed(expr) {
        return true;
    }
    if expr.ty.is_primitive() {
        return false;
    }
    match &expr.kind {
        ExprKind::Literal { .. }
        | ExprKind::New { .. }
        | ExprKind::NewArray { .. }
        | ExprKind::This
        | ExprKind::TypeAccess { .. }
        | ExprKind::Lambda
        | ExprKind::Unary { .. }
        | ExprKind::InstanceOf { .. } => false,
        // String concatenation; every other operator is primitive-typed
        ExprKind::Binary { .. } => false,
        ExprKind::Local { .. } | ExprKind::Param { .. } | ExprKind::Field { .. } => match var_of(expr) {
            Some(var) => facts.get(&var).copied().unwrap_or(true),
            None => true,
        },
        ExprKind::ArrayAccess { .. } => true,
        ExprKind::Invoke { .. } => oracle.call_may_return_null(expr),
        ExprKind::Conditional {
            then_expr, else_expr, ..
        } => eval(then_expr, facts, oracle) || eval(else_expr, facts, oracle),
        ExprKind::Cast { operand } => eval(operand, facts, oracle),
        ExprKind::Assign { value, .. } => eval(value, facts, oracle),
    }
}
