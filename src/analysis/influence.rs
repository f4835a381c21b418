//! Parameters whose value flows into a field write

use crate::cfg::{def_use_paths, Cfg, PathLimits};
use crate::model::{ExecutableDecl, VarId};
use std::collections::BTreeSet;

/// Indices of parameters that reach a field write of the target class,
/// directly or through a chain of local definitions
pub fn influential_params(cfg: &Cfg, exec: &ExecutableDecl, limits: &PathLimits) -> BTreeSet<usize> {
    let mut out = BTreeSet::new();
    for node in cfg.node_indices() {
        if !cfg[node].writes().iter().any(VarId::is_field) {
            continue;
        }
        for path in def_use_paths(cfg, node, None, limits) {
            for &n in &path.nodes {
                for var in cfg[n].reads() {
                    if let VarId::Param(name) = var {
                        if let Some(idx) = exec.param_index(&name) {
                            out.insert(idx);
                        }
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::model::build::*;
    use crate::model::{TypeRef, Visibility};

    fn obj() -> TypeRef {
        TypeRef::object("Foo")
    }

    #[test]
    fn test_direct_and_transitive_flow() {
        // C(Foo a, Foo b, int n) { Foo t = b; this.x = a; this.y = t; }
        let ctor = constructor(Visibility::Public)
            .param("a", obj())
            .param("b", obj())
            .param("n", TypeRef::int())
            .body(vec![
                local_decl(1, "t", obj(), Some(param_ref("b", obj()))),
                assign(2, field_of(this_ref("C"), "x", obj()), param_ref("a", obj())),
                assign(3, field_ref("y", obj()), local_ref("t", obj())),
            ])
            .build();
        let cfg = build_cfg(&ctor).unwrap();
        let params = influential_params(&cfg, &ctor, &PathLimits::default());
        assert_eq!(params.into_iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_no_field_writes() {
        let ctor = constructor(Visibility::Public)
            .param("a", obj())
            .body(vec![expr_stmt(1, call_on(param_ref("a", obj()), "foo()", TypeRef::Void))])
            .build();
        let cfg = build_cfg(&ctor).unwrap();
        assert!(influential_params(&cfg, &ctor, &PathLimits::default()).is_empty());
    }
}
