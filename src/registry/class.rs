//! Registry of the single class under analysis

use crate::model::visit::{collect_literals, receiver_type, walk_body_exprs};
use crate::model::{ClassModel, ExecutableDecl, Expr, ExprKind, FieldDecl, Literal};
use crate::nullability::FieldTable;
use crate::registry::{Signature, SignatureMatcher};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Signatures, fields and per-class caches of the target class
///
/// Immutable after registration except for the caches (field table, NPE line
/// bookkeeping, resolution memo), which only ever grow.
pub struct ClassRegistry {
    model: ClassModel,
    by_signature: BTreeMap<Signature, usize>,
    visible: BTreeSet<Signature>,
    hidden: BTreeSet<Signature>,
    literals_by_executable: BTreeMap<Signature, Vec<Literal>>,
    class_literals: Vec<Literal>,
    fields: FieldTable,
    matcher: Box<dyn SignatureMatcher>,
    resolved: RefCell<HashMap<String, Option<Signature>>>,
    npe_lines: BTreeMap<Signature, BTreeSet<u32>>,
    found_npe_lines: BTreeSet<u32>,
}

impl ClassRegistry {
    /// Index `model` by signature
    ///
    /// Statement ids are assigned here. A duplicate signature keeps the first
    /// executable and logs the second.
    pub fn register_class(mut model: ClassModel, matcher: Box<dyn SignatureMatcher>) -> Self {
        for exec in &mut model.executables {
            if let Some(body) = exec.body.as_mut() {
                body.number_statements();
            }
        }

        let mut by_signature = BTreeMap::new();
        let mut visible = BTreeSet::new();
        let mut hidden = BTreeSet::new();
        let mut literals_by_executable = BTreeMap::new();
        let mut class_literals = Vec::new();

        for (idx, exec) in model.executables.iter().enumerate() {
            let sig = Signature::new(&exec.qualified_signature(&model.name));
            if by_signature.contains_key(&sig) {
                tracing::warn!(signature = %sig, "duplicate signature, keeping first declaration");
                continue;
            }
            if exec.visibility.is_target_visible() {
                visible.insert(sig.clone());
            } else {
                hidden.insert(sig.clone());
            }
            let literals = executable_literals(exec);
            for lit in &literals {
                push_unique(&mut class_literals, lit.clone());
            }
            literals_by_executable.insert(sig.clone(), literals);
            by_signature.insert(sig, idx);
        }

        for field in &model.fields {
            if let Some(init) = &field.initializer {
                let mut found = Vec::new();
                collect_literals(init, &mut found);
                for lit in found {
                    push_unique(&mut class_literals, lit);
                }
            }
        }

        tracing::debug!(
            class = %model.name,
            executables = by_signature.len(),
            fields = model.fields.len(),
            matcher = matcher.name(),
            "class registered"
        );

        Self {
            model,
            by_signature,
            visible,
            hidden,
            literals_by_executable,
            class_literals,
            fields: FieldTable::new(),
            matcher,
            resolved: RefCell::new(HashMap::new()),
            npe_lines: BTreeMap::new(),
            found_npe_lines: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.model.name
    }

    pub fn model(&self) -> &ClassModel {
        &self.model
    }

    /// `None` means out of analysis scope, never an error
    pub fn lookup_executable(&self, signature: &str) -> Option<&ExecutableDecl> {
        self.by_signature
            .get(signature)
            .and_then(|&idx| self.model.executables.get(idx))
    }

    /// All signatures in registry order
    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.by_signature.keys()
    }

    pub fn executables(&self) -> impl Iterator<Item = (&Signature, &ExecutableDecl)> {
        self.by_signature
            .iter()
            .filter_map(|(sig, &idx)| self.model.executables.get(idx).map(|e| (sig, e)))
    }

    pub fn constructors(&self) -> impl Iterator<Item = (&Signature, &ExecutableDecl)> {
        self.executables().filter(|(_, e)| e.is_constructor())
    }

    pub fn methods(&self) -> impl Iterator<Item = (&Signature, &ExecutableDecl)> {
        self.executables().filter(|(_, e)| !e.is_constructor())
    }

    /// Public and protected executables
    pub fn visible(&self) -> &BTreeSet<Signature> {
        &self.visible
    }

    /// Private and package-private executables
    pub fn hidden(&self) -> &BTreeSet<Signature> {
        &self.hidden
    }

    pub fn is_visible(&self, signature: &str) -> bool {
        self.visible.contains(signature)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.model.field(name)
    }

    /// Whether a call-site signature belongs to this class
    ///
    /// An absent or empty signature is treated as ours.
    pub fn is_own_method(&self, candidate: Option<&str>) -> bool {
        match candidate {
            None => true,
            Some(s) if s.is_empty() => true,
            Some(s) => self.resolve(s).is_some(),
        }
    }

    /// Resolve a possibly partial signature to a registered one
    ///
    /// Exact hits win; otherwise the first signature in registry order that
    /// the matcher accepts. Ambiguous matches are not reported.
    pub fn resolve(&self, candidate: &str) -> Option<Signature> {
        if let Some(hit) = self.resolved.borrow().get(candidate) {
            return hit.clone();
        }
        let found = match self.by_signature.get_key_value(candidate) {
            Some((sig, _)) => Some(sig.clone()),
            None => self
                .by_signature
                .keys()
                .find(|known| self.matcher.matches(candidate, known.as_str()))
                .cloned(),
        };
        tracing::trace!(candidate, resolved = ?found, "signature resolution");
        self.resolved
            .borrow_mut()
            .insert(candidate.to_string(), found.clone());
        found
    }

    /// Resolve the callee of an invocation to an in-scope executable
    ///
    /// Calls whose declaring type or receiver type is another class are out
    /// of scope regardless of the signature text.
    pub fn resolve_call(&self, call: &Expr) -> Option<Signature> {
        let ExprKind::Invoke {
            receiver,
            method,
            owner,
            ..
        } = &call.kind
        else {
            return None;
        };
        self.resolve_scoped(method, owner.as_deref(), receiver_type(receiver.as_deref()))
    }

    /// `resolve` restricted to calls declared on, and made through, this class
    ///
    /// `receiver_type` is None for implicit or `this` receivers.
    pub fn resolve_scoped(&self, method: &str, owner: Option<&str>, receiver_type: Option<&str>) -> Option<Signature> {
        let foreign = |ty: Option<&str>| ty.is_some_and(|t| !t.is_empty() && t != self.model.name);
        if foreign(owner) || foreign(receiver_type) {
            return None;
        }
        self.resolve(method)
    }

    /// Literals appearing in one executable
    pub fn literals_of(&self, signature: &str) -> &[Literal] {
        self.literals_by_executable
            .get(signature)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Literals anywhere in the class, field initializers included
    pub fn class_literals(&self) -> &[Literal] {
        &self.class_literals
    }

    pub fn field_table(&self) -> &FieldTable {
        &self.fields
    }

    pub fn set_field_table(&mut self, fields: FieldTable) {
        self.fields = fields;
    }

    pub fn record_npe_lines(&mut self, signature: &Signature, lines: impl IntoIterator<Item = u32>) {
        self.npe_lines
            .entry(signature.clone())
            .or_default()
            .extend(lines);
    }

    /// Candidate NPE lines of one executable
    pub fn npe_lines(&self, signature: &str) -> Option<&BTreeSet<u32>> {
        self.npe_lines.get(signature)
    }

    /// Record a line where the generator observed an NPE; false if already known
    pub fn mark_npe_found(&mut self, line: u32) -> bool {
        self.found_npe_lines.insert(line)
    }

    pub fn is_npe_found(&self, line: u32) -> bool {
        self.found_npe_lines.contains(&line)
    }

    pub fn found_npe_lines(&self) -> &BTreeSet<u32> {
        &self.found_npe_lines
    }
}

fn executable_literals(exec: &ExecutableDecl) -> Vec<Literal> {
    let mut out = Vec::new();
    if let Some(body) = &exec.body {
        walk_body_exprs(&body.stmts, &mut |_, e| {
            if let ExprKind::Literal { value } = &e.kind {
                push_unique(&mut out, value.clone());
            }
        });
    }
    out
}

fn push_unique(out: &mut Vec<Literal>, lit: Literal) {
    if !out.contains(&lit) {
        out.push(lit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build::*;
    use crate::model::{StmtId, StmtKind, TypeRef, Visibility};
    use crate::registry::{ExactMatcher, SubstringMatcher};

    fn sample() -> ClassModel {
        class("pkg.Cls")
            .field_init("label", TypeRef::string(), str_lit("init"))
            .executable(constructor(Visibility::Public).build())
            .executable(
                method("get", Visibility::Public)
                    .param("key", TypeRef::string())
                    .returns(TypeRef::object("Foo"))
                    .body(vec![
                        local_decl(1, "n", TypeRef::int(), Some(int_lit(3))),
                        if_stmt(2, local_ref("c", TypeRef::boolean()), vec![ret(3, Some(null()))], None),
                        ret(4, Some(new_object("Foo", vec![]))),
                    ])
                    .build(),
            )
            .executable(method("helper", Visibility::Private).build())
            .build()
    }

    fn registry() -> ClassRegistry {
        ClassRegistry::register_class(sample(), Box::new(SubstringMatcher))
    }

    #[test]
    fn test_lookup_and_visibility_split() {
        let reg = registry();
        assert!(reg.lookup_executable("pkg.Cls.get(java.lang.String)").is_some());
        assert!(reg.lookup_executable("pkg.Cls.missing()").is_none());
        assert!(reg.is_visible("pkg.Cls.get(java.lang.String)"));
        assert!(reg.is_visible("pkg.Cls()"));
        assert!(reg.hidden().contains("pkg.Cls.helper()"));
        assert_eq!(reg.constructors().count(), 1);
        assert_eq!(reg.methods().count(), 2);
    }

    #[test]
    fn test_statement_ids_assigned_in_preorder() {
        let reg = registry();
        let get = reg.lookup_executable("pkg.Cls.get(java.lang.String)").unwrap();
        let stmts = &get.body.as_ref().unwrap().stmts;
        assert_eq!(stmts[0].id, StmtId(1));
        assert_eq!(stmts[1].id, StmtId(2));
        let StmtKind::If { then_branch, .. } = &stmts[1].kind else {
            panic!("expected if");
        };
        assert_eq!(then_branch.stmts[0].id, StmtId(3));
        assert_eq!(stmts[2].id, StmtId(4));
    }

    #[test]
    fn test_partial_signature_resolution() {
        let reg = registry();
        assert_eq!(
            reg.resolve("get(java.lang.String)").map(|s| s.to_string()),
            Some("pkg.Cls.get(java.lang.String)".to_string())
        );
        assert!(reg.is_own_method(Some("helper()")));
        assert!(!reg.is_own_method(Some("java.util.List.size()")));
        assert!(reg.is_own_method(None));
        assert!(reg.is_own_method(Some("")));
    }

    #[test]
    fn test_exact_matcher_rejects_partial() {
        let reg = ClassRegistry::register_class(sample(), Box::new(ExactMatcher));
        assert!(reg.resolve("get(java.lang.String)").is_none());
        assert!(reg.resolve("pkg.Cls.get(java.lang.String)").is_some());
    }

    #[test]
    fn test_resolve_call_respects_receiver_type() {
        let reg = registry();
        let own = call_self("helper()", vec![], TypeRef::Void);
        assert!(reg.resolve_call(&own).is_some());

        let foreign = call_on(local_ref("other", TypeRef::object("pkg.Other")), "helper()", TypeRef::Void);
        assert!(reg.resolve_call(&foreign).is_none());

        let owned_elsewhere = with_owner(call_self("helper()", vec![], TypeRef::Void), "pkg.Base");
        assert!(reg.resolve_call(&owned_elsewhere).is_none());
    }

    #[test]
    fn test_duplicate_signature_keeps_first() {
        let model = class("pkg.Cls")
            .executable(method("m", Visibility::Public).returns(TypeRef::int()).build())
            .executable(method("m", Visibility::Private).build())
            .build();
        let reg = ClassRegistry::register_class(model, Box::new(SubstringMatcher));
        assert_eq!(reg.signatures().count(), 1);
        assert!(reg.is_visible("pkg.Cls.m()"));
        assert_eq!(reg.lookup_executable("pkg.Cls.m()").unwrap().return_type, TypeRef::int());
    }

    #[test]
    fn test_literal_inventory() {
        let reg = registry();
        let lits = reg.literals_of("pkg.Cls.get(java.lang.String)");
        assert!(lits.contains(&Literal::Int(3)));
        assert!(lits.contains(&Literal::Null));
        assert!(reg.class_literals().contains(&Literal::Str("init".into())));
    }

    #[test]
    fn test_npe_line_bookkeeping() {
        let mut reg = registry();
        let sig = Signature::new("pkg.Cls.get(java.lang.String)");
        reg.record_npe_lines(&sig, [4, 2]);
        assert_eq!(reg.npe_lines(sig.as_str()).unwrap().len(), 2);
        assert!(reg.mark_npe_found(4));
        assert!(!reg.mark_npe_found(4));
        assert!(reg.is_npe_found(4));
        assert!(!reg.is_npe_found(2));
    }
}
