//! Variable, field and literal queries over the program model

use super::*;
use std::collections::BTreeSet;

/// Variable an expression names directly, if it is a tracked one
///
/// Only fields of the target class (implicit receiver or `this`) are tracked;
/// `other.f` reads `other` but `f` itself has no identity here.
pub fn var_of(expr: &Expr) -> Option<VarId> {
    match &expr.kind {
        ExprKind::Local { name } => Some(VarId::Local(name.clone())),
        ExprKind::Param { name } => Some(VarId::Param(name.clone())),
        ExprKind::Field { receiver, name } => match receiver.as_deref() {
            None => Some(VarId::Field(name.clone())),
            Some(r) if matches!(r.kind, ExprKind::This) => Some(VarId::Field(name.clone())),
            Some(_) => None,
        },
        _ => None,
    }
}

/// Direct subexpressions in evaluation order
pub fn children(expr: &Expr) -> Vec<&Expr> {
    match &expr.kind {
        ExprKind::Literal { .. }
        | ExprKind::Local { .. }
        | ExprKind::Param { .. }
        | ExprKind::This
        | ExprKind::TypeAccess { .. }
        | ExprKind::Lambda => Vec::new(),
        ExprKind::Field { receiver, .. } => receiver.iter().map(|r| &**r).collect(),
        ExprKind::ArrayAccess { array, index } => vec![&**array, &**index],
        ExprKind::Invoke { receiver, args, .. } => receiver
            .iter()
            .map(|r| &**r)
            .chain(args.iter())
            .collect(),
        ExprKind::New { args, .. } => args.iter().collect(),
        ExprKind::NewArray { dims, elements } => dims.iter().chain(elements.iter()).collect(),
        ExprKind::Unary { operand, .. } => vec![&**operand],
        ExprKind::Binary { lhs, rhs, .. } => vec![&**lhs, &**rhs],
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => vec![&**cond, &**then_expr, &**else_expr],
        ExprKind::Cast { operand } | ExprKind::InstanceOf { operand, .. } => vec![&**operand],
        ExprKind::Assign { target, value } => vec![&**target, &**value],
    }
}

/// Pre-order walk over an expression tree
pub fn walk_expr<'a>(expr: &'a Expr, f: &mut dyn FnMut(&'a Expr)) {
    f(expr);
    for child in children(expr) {
        walk_expr(child, f);
    }
}

/// Collect every tracked variable read while evaluating `expr`
pub fn collect_reads(expr: &Expr, out: &mut BTreeSet<VarId>) {
    match &expr.kind {
        ExprKind::Local { .. } | ExprKind::Param { .. } | ExprKind::Field { .. } => {
            if let Some(var) = var_of(expr) {
                out.insert(var);
            } else if let ExprKind::Field {
                receiver: Some(r), ..
            } = &expr.kind
            {
                collect_reads(r, out);
            }
        }
        ExprKind::Assign { target, value } => {
            collect_target_reads(target, out);
            collect_reads(value, out);
        }
        _ => {
            for child in children(expr) {
                collect_reads(child, out);
            }
        }
    }
}

/// Reads performed while evaluating an assignment target, excluding the
/// assigned variable itself
pub fn collect_target_reads(target: &Expr, out: &mut BTreeSet<VarId>) {
    match &target.kind {
        ExprKind::ArrayAccess { array, index } => {
            collect_reads(array, out);
            collect_reads(index, out);
        }
        ExprKind::Field {
            receiver: Some(r), ..
        } if !matches!(r.kind, ExprKind::This) => collect_reads(r, out),
        _ => {}
    }
}

/// Variable defined by assigning to `target`
///
/// Writing an array element counts as defining the array variable.
pub fn written_var(target: &Expr) -> Option<VarId> {
    match &target.kind {
        ExprKind::ArrayAccess { array, .. } => var_of(array),
        ExprKind::Cast { operand } => written_var(operand),
        _ => var_of(target),
    }
}

/// Collect variables written by assignment expressions and increments
/// nested inside `expr`
pub fn collect_writes(expr: &Expr, out: &mut BTreeSet<VarId>) {
    walk_expr(expr, &mut |e| match &e.kind {
        ExprKind::Assign { target, .. } => {
            if let Some(var) = written_var(target) {
                out.insert(var);
            }
        }
        ExprKind::Unary { op, operand } if op.writes_operand() => {
            if let Some(var) = written_var(operand) {
                out.insert(var);
            }
        }
        _ => {}
    });
}

/// Expressions owned directly by a statement, not by nested statements
pub fn stmt_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match &stmt.kind {
        StmtKind::Local { init, .. } => init.iter().collect(),
        StmtKind::Assign { target, value } => vec![target, value],
        StmtKind::Expr { expr } => vec![expr],
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } | StmtKind::DoWhile { cond, .. } => {
            vec![cond]
        }
        StmtKind::For { cond, .. } => cond.iter().collect(),
        StmtKind::ForEach { iterable, .. } => vec![iterable],
        StmtKind::Switch { selector, cases } => std::iter::once(selector)
            .chain(cases.iter().flat_map(|c| c.labels.iter()))
            .collect(),
        StmtKind::Return { value } => value.iter().collect(),
        StmtKind::Throw { value } => vec![value],
        StmtKind::Break | StmtKind::Continue | StmtKind::Block { .. } | StmtKind::Try { .. } => {
            Vec::new()
        }
    }
}

/// Statements nested directly inside a compound statement, in source order
pub fn nested_blocks(stmt: &Stmt) -> Vec<&[Stmt]> {
    match &stmt.kind {
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            let mut blocks = vec![then_branch.stmts.as_slice()];
            if let Some(e) = else_branch {
                blocks.push(e.stmts.as_slice());
            }
            blocks
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => vec![body.stmts.as_slice()],
        StmtKind::For {
            init, update, body, ..
        } => vec![init.as_slice(), body.stmts.as_slice(), update.as_slice()],
        StmtKind::ForEach { body, .. } => vec![body.stmts.as_slice()],
        StmtKind::Switch { cases, .. } => cases.iter().map(|c| c.body.stmts.as_slice()).collect(),
        StmtKind::Block { body } => vec![body.stmts.as_slice()],
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            let mut blocks = vec![body.stmts.as_slice()];
            blocks.extend(catches.iter().map(|c| c.body.stmts.as_slice()));
            if let Some(f) = finally {
                blocks.push(f.stmts.as_slice());
            }
            blocks
        }
        _ => Vec::new(),
    }
}

/// Pre-order walk over every statement of a body, nested ones included
///
/// Uses an explicit stack; bodies can nest arbitrarily deep.
pub fn walk_stmts<'a>(stmts: &'a [Stmt], f: &mut dyn FnMut(&'a Stmt)) {
    let mut stack: Vec<&'a Stmt> = stmts.iter().rev().collect();
    while let Some(stmt) = stack.pop() {
        f(stmt);
        for block in nested_blocks(stmt).into_iter().rev() {
            stack.extend(block.iter().rev());
        }
    }
}

/// Walk every expression of a body, nested statements included
pub fn walk_body_exprs<'a>(stmts: &'a [Stmt], f: &mut dyn FnMut(&'a Stmt, &'a Expr)) {
    walk_stmts(stmts, &mut |stmt| {
        for e in stmt_exprs(stmt) {
            walk_expr(e, &mut |sub| f(stmt, sub));
        }
    });
}

/// Literals occurring in `expr`, duplicates skipped
pub fn collect_literals(expr: &Expr, out: &mut Vec<Literal>) {
    walk_expr(expr, &mut |e| {
        if let ExprKind::Literal { value } = &e.kind {
            if !out.contains(value) {
                out.push(value.clone());
            }
        }
    });
}

/// Whether the expression is the `null` literal or otherwise typed null
pub fn is_null_typed(expr: &Expr) -> bool {
    expr.ty.is_null() || matches!(expr.kind, ExprKind::Literal { value: Literal::Null })
}

/// Whether the expression may evaluate to a null-typed value syntactically:
/// null itself, a conditional with a null arm, or a cast of either
pub fn may_be_null_literal(expr: &Expr) -> bool {
    match &expr.kind {
        _ if is_null_typed(expr) => true,
        ExprKind::Conditional {
            then_expr,
            else_expr,
            ..
        } => may_be_null_literal(then_expr) || may_be_null_literal(else_expr),
        ExprKind::Cast { operand } => may_be_null_literal(operand),
        _ => false,
    }
}

/// If `expr` compares a variable against null (`v == null`, `null != v`),
/// return the variable and whether the comparison is `==`
pub fn null_comparison(expr: &Expr) -> Option<(VarId, bool)> {
    if let ExprKind::Binary { op, lhs, rhs } = &expr.kind {
        if !op.is_equality() {
            return None;
        }
        let var = if is_null_typed(rhs) {
            var_of(lhs)
        } else if is_null_typed(lhs) {
            var_of(rhs)
        } else {
            None
        }?;
        return Some((var, *op == BinaryOp::Eq));
    }
    None
}

/// Declared type of an explicit, non-`this` receiver
pub fn receiver_type(receiver: Option<&Expr>) -> Option<&str> {
    match receiver {
        Some(recv) if !matches!(recv.kind, ExprKind::This) => match &recv.ty {
            TypeRef::Reference(ty) => Some(ty.as_str()),
            _ => None,
        },
        _ => None,
    }
}
