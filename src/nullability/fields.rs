//! Field nullability classification
//!
//! A reference field is provably non-null when it has a non-null default
//! initializer, or when every constructor assigns it a non-null value on every
//! route. Evidence to the contrary (a null write anywhere, a null comparison
//! anywhere) demotes it to possibly null, and nothing promotes it back.

use crate::model::visit::{may_be_null_literal, null_comparison, walk_body_exprs, walk_stmts, written_var};
use crate::model::{ClassModel, Expr, ExprKind, FieldDecl, Stmt, StmtKind, VarId};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldNullability {
    ProvablyNonNull,
    PossiblyNull,
    Unknown,
}

/// Classification of every field of the target class
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FieldTable {
    entries: BTreeMap<String, FieldNullability>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Unknown` for names that are not fields of the target class
    pub fn get(&self, name: &str) -> FieldNullability {
        self.entries.get(name).copied().unwrap_or(FieldNullability::Unknown)
    }

    pub fn is_provably_non_null(&self, name: &str) -> bool {
        self.get(name) == FieldNullability::ProvablyNonNull
    }

    /// Record non-null evidence; ignored once the field is possibly null
    pub fn mark_non_null(&mut self, name: &str) {
        let entry = self.entries.entry(name.to_string()).or_insert(FieldNullability::Unknown);
        if *entry != FieldNullability::PossiblyNull {
            *entry = FieldNullability::ProvablyNonNull;
        }
    }

    pub fn mark_possibly_null(&mut self, name: &str) {
        self.entries.insert(name.to_string(), FieldNullability::PossiblyNull);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldNullability)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Fields that are not provably non-null
    pub fn nullable_fields(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, n)| *n != FieldNullability::ProvablyNonNull)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn provably_non_null_fields(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, n)| *n == FieldNullability::ProvablyNonNull)
            .map(|(name, _)| name)
    }
}

/// Classify every field of `class`
pub fn classify_fields(class: &ClassModel) -> FieldTable {
    let mut table = FieldTable::new();
    let constructors: Vec<&[Stmt]> = class
        .constructors()
        .map(|c| c.body.as_ref().map(|b| b.stmts.as_slice()).unwrap_or(&[]))
        .collect();

    for field in &class.fields {
        if field.ty.is_primitive() {
            table.mark_non_null(&field.name);
            continue;
        }
        if initialized_non_null(field, &constructors) {
            table.mark_non_null(&field.name);
        } else {
            table.mark_possibly_null(&field.name);
        }
    }

    // Counter-evidence anywhere in the class
    for exec in &class.executables {
        let Some(body) = &exec.body else { continue };

        walk_stmts(&body.stmts, &mut |stmt| {
            if let StmtKind::Assign { target, value } = &stmt.kind {
                demote_null_write(&mut table, class, target, value);
            }
        });
        walk_body_exprs(&body.stmts, &mut |_, expr| match &expr.kind {
            ExprKind::Assign { target, value } => demote_null_write(&mut table, class, target, value),
            ExprKind::Binary { .. } => {
                if let Some((VarId::Field(name), _)) = null_comparison(expr) {
                    if class.field(&name).is_some() {
                        tracing::trace!(field = %name, "field compared against null");
                        table.mark_possibly_null(&name);
                    }
                }
            }
            _ => {}
        });
    }

    table
}

fn demote_null_write(table: &mut FieldTable, class: &ClassModel, target: &Expr, value: &Expr) {
    if let Some(VarId::Field(name)) = written_var(target) {
        if may_be_null_literal(value) && class.field(&name).is_some_and(|f| !f.ty.is_primitive()) {
            tracing::trace!(field = %name, "null written to field");
            table.mark_possibly_null(&name);
        }
    }
}

fn initialized_non_null(field: &FieldDecl, constructors: &[&[Stmt]]) -> bool {
    if let Some(init) = &field.initializer {
        if !may_be_null_literal(init) {
            return true;
        }
    }
    // No explicit constructor: the implicit one initializes nothing
    !constructors.is_empty() && constructors.iter().all(|body| definitely_assigns(body, &field.name))
}

/// Whether every route through `stmts` assigns a non-null value to the field
///
/// Scanning stops at the first statement that may `return` or always throws:
/// an object can escape the constructor before anything later runs.
fn definitely_assigns(stmts: &[Stmt], field: &str) -> bool {
    for stmt in stmts {
        let assigned = match &stmt.kind {
            StmtKind::Assign { target, value } => assigns_non_null(target, value, field),
            StmtKind::Expr { expr } => match &expr.kind {
                ExprKind::Assign { target, value } => assigns_non_null(target, value, field),
                _ => false,
            },
            StmtKind::If {
                then_branch,
                else_branch: Some(else_branch),
                ..
            } => definitely_assigns(&then_branch.stmts, field) && definitely_assigns(&else_branch.stmts, field),
            StmtKind::Block { body } => definitely_assigns(&body.stmts, field),
            _ => false,
        };
        if assigned {
            return true;
        }
        if may_return(stmt) || always_throws(stmt) {
            return false;
        }
    }
    false
}

fn may_return(stmt: &Stmt) -> bool {
    let mut found = false;
    walk_stmts(std::slice::from_ref(stmt), &mut |s| {
        found |= matches!(s.kind, StmtKind::Return { .. });
    });
    found
}

fn always_throws(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Throw { .. } => true,
        StmtKind::Block { body } => body.stmts.iter().any(always_throws),
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => then_branch.stmts.iter().any(always_throws) && else_branch.stmts.iter().any(always_throws),
        _ => false,
    }
}

fn assigns_non_null(target: &Expr, value: &Expr, field: &str) -> bool {
    matches!(written_var(target), Some(VarId::Field(ref name)) if name == field)
        && !matches!(target.kind, ExprKind::ArrayAccess { .. })
        && !may_be_null_literal(value)
}
