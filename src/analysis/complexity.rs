//! Cyclomatic complexity of an executable body

use crate::model::visit::{walk_body_exprs, walk_stmts};
use crate::model::{ExecutableDecl, ExprKind, StmtKind};

/// 1 + number of decision points
///
/// Decision points: `if`, every loop, each `case` label, each `catch`,
/// conditional expressions and short-circuit operators. Bodiless
/// executables have complexity 1.
pub fn cyclomatic_complexity(exec: &ExecutableDecl) -> u32 {
    let Some(body) = &exec.body else {
        return 1;
    };

    let mut decisions = 0u32;
    walk_stmts(&body.stmts, &mut |stmt| {
        decisions += match &stmt.kind {
            StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::DoWhile { .. }
            | StmtKind::For { .. }
            | StmtKind::ForEach { .. } => 1,
            StmtKind::Switch { cases, .. } => cases.iter().map(|c| c.labels.len() as u32).sum(),
            StmtKind::Try { catches, .. } => catches.len() as u32,
            _ => 0,
        };
    });
    walk_body_exprs(&body.stmts, &mut |_, expr| match &expr.kind {
        ExprKind::Conditional { .. } => decisions += 1,
        ExprKind::Binary { op, .. } if op.is_logical() => decisions += 1,
        _ => {}
    });

    1 + decisions
}
