//! Facts derived from `null` literals inside one executable

use crate::model::visit::{
    is_null_typed, may_be_null_literal, null_comparison, receiver_type, stmt_exprs, walk_body_exprs, walk_expr, walk_stmts,
    written_var,
};
use crate::model::{ExecutableDecl, ExprKind, Stmt, StmtKind, VarId};
use serde::Serialize;
use std::collections::BTreeSet;

/// A `null` literal passed as an argument at a call site
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct NullArgument {
    /// Callee as written at the call site
    pub callee: String,
    /// Declaring type of the callee, when known
    pub owner: Option<String>,
    /// Type of an explicit non-`this` receiver
    pub receiver_type: Option<String>,
    /// Zero-based argument position
    pub index: usize,
    pub line: u32,
}

/// Null-literal facts of one executable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NullLiteralSummary {
    /// Parameters compared against null or assigned a null value
    pub nullable_params: BTreeSet<String>,
    /// Locals declared with or assigned a null value
    pub null_assigned_locals: BTreeSet<String>,
    /// Reference-typed locals
    pub candidate_locals: BTreeSet<String>,
    /// Null arguments at call sites, resolved against the class later
    pub null_arguments: Vec<NullArgument>,
    /// Reads of locals whose declaration initializes them to null
    pub null_local_reads: usize,
}

/// Scan an executable body for null literals
pub fn analyze_literals(exec: &ExecutableDecl) -> NullLiteralSummary {
    let mut summary = NullLiteralSummary::default();
    let Some(body) = &exec.body else {
        return summary;
    };

    let mut null_initialized: BTreeSet<String> = BTreeSet::new();
    walk_stmts(&body.stmts, &mut |stmt| {
        match &stmt.kind {
            StmtKind::Local { name, ty, init } => {
                if !ty.is_primitive() {
                    summary.candidate_locals.insert(name.clone());
                }
                if init.as_ref().is_some_and(may_be_null_literal) {
                    summary.null_assigned_locals.insert(name.clone());
                    null_initialized.insert(name.clone());
                }
            }
            StmtKind::Assign { target, value } if may_be_null_literal(value) => {
                record_null_assignment(&mut summary, written_var(target));
            }
            StmtKind::ForEach { var, ty, .. } if !ty.is_primitive() => {
                summary.candidate_locals.insert(var.clone());
            }
            _ => {}
        }
        check_param_comparisons(&mut summary, stmt);
    });

    walk_body_exprs(&body.stmts, &mut |stmt, expr| match &expr.kind {
        ExprKind::Assign { target, value } if may_be_null_literal(value) => {
            record_null_assignment(&mut summary, written_var(target));
        }
        ExprKind::Invoke {
            receiver,
            method,
            args,
            owner,
        } => {
            for (index, arg) in args.iter().enumerate() {
                if is_null_typed(arg) {
                    summary.null_arguments.push(NullArgument {
                        callee: method.clone(),
                        owner: owner.clone(),
                        receiver_type: receiver_type(receiver.as_deref()).map(str::to_string),
                        index,
                        line: stmt.line,
                    });
                }
            }
        }
        _ => {}
    });

    summary.null_local_reads = count_local_reads(&body.stmts, &null_initialized);
    summary
}

fn record_null_assignment(summary: &mut NullLiteralSummary, var: Option<VarId>) {
    match var {
        Some(VarId::Local(name)) => {
            summary.null_assigned_locals.insert(name);
        }
        Some(VarId::Param(name)) => {
            summary.nullable_params.insert(name);
        }
        _ => {}
    }
}

/// Flag parameters compared against null, unless the statement is an `if`
/// whose null branch throws
fn check_param_comparisons(summary: &mut NullLiteralSummary, stmt: &Stmt) {
    for root in stmt_exprs(stmt) {
        walk_expr(root, &mut |e| {
            let Some((VarId::Param(name), is_eq)) = null_comparison(e) else {
                return;
            };
            if std::ptr::eq(e, root) && null_branch_throws(stmt, is_eq) {
                tracing::trace!(param = %name, line = stmt.line, "null check guarded by throw");
                return;
            }
            summary.nullable_params.insert(name);
        });
    }
}

fn null_branch_throws(stmt: &Stmt, is_eq: bool) -> bool {
    let StmtKind::If {
        then_branch,
        else_branch,
        ..
    } = &stmt.kind
    else {
        return false;
    };
    let null_branch = if is_eq { Some(then_branch) } else { else_branch.as_ref() };
    let Some(block) = null_branch else {
        return false;
    };
    let mut throws = false;
    walk_stmts(&block.stmts, &mut |s| {
        if matches!(s.kind, StmtKind::Throw { .. }) {
            throws = true;
        }
    });
    throws
}

fn count_local_reads(stmts: &[Stmt], locals: &BTreeSet<String>) -> usize {
    if locals.is_empty() {
        return 0;
    }
    let is_tracked = |e: &crate::model::Expr| matches!(&e.kind, ExprKind::Local { name } if locals.contains(name));

    let mut occurrences: usize = 0;
    walk_body_exprs(stmts, &mut |_, e| {
        if is_tracked(e) {
            occurrences += 1;
        }
    });

    // Plain assignment targets are writes, not reads
    let mut targets: usize = 0;
    walk_stmts(stmts, &mut |stmt| {
        if let StmtKind::Assign { target, .. } = &stmt.kind {
            if is_tracked(target) {
                targets += 1;
            }
        }
    });
    walk_body_exprs(stmts, &mut |_, e| {
        if let ExprKind::Assign { target, .. } = &e.kind {
            if is_tracked(target) {
                targets += 1;
            }
        }
    });

    occurrences.saturating_sub(targets)
}
