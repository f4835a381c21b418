// Statement-level control flow graphs for executables of the target class

pub mod analysis;
pub mod builder;
pub mod edge;
pub mod export;
pub mod loops;
pub mod paths;
pub mod reachability;
pub mod simplify;

pub use analysis::{
    find_entry, find_exit, find_node_by_id, find_node_by_stmt, in_degree, out_degree, return_nodes, statement_nodes,
};
pub use builder::{build_cfg, CfgBuilder};
pub use edge::{CfgEdge, EdgeType};
pub use export::{export_dot, export_json, CFGExport};
pub use loops::{detect_natural_loops, loop_subgraph, loop_subgraphs, LoopSubgraph, NaturalLoop};
pub use paths::{backward_paths, def_use_paths, Path, PathKind, PathLimits};
pub use reachability::{find_reachable, reachable_nodes_backward};
pub use simplify::simplify;

use crate::model::visit::{collect_reads, collect_target_reads, collect_writes, written_var};
use crate::model::{Expr, Stmt, StmtId, StmtKind, TypeRef, VarId};
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Control Flow Graph
pub type Cfg = DiGraph<CfgNode, CfgEdge>;

/// Node identifier, stable across simplification
pub type NodeId = usize;

/// Node in a CFG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfgNode {
    /// Unique identifier within the executable
    pub id: NodeId,
    pub kind: NodeKind,
    /// Statement this node was built from
    pub stmt: Option<StmtId>,
    /// Source line of that statement
    pub line: Option<u32>,
    /// Code evaluated when control reaches the node
    pub code: Option<NodeCode>,
}

impl CfgNode {
    /// Variables read by this node
    pub fn reads(&self) -> BTreeSet<VarId> {
        self.code.as_ref().map(NodeCode::reads).unwrap_or_default()
    }

    /// Variables defined by this node
    pub fn writes(&self) -> BTreeSet<VarId> {
        self.code.as_ref().map(NodeCode::writes).unwrap_or_default()
    }

    pub fn line_or_zero(&self) -> u32 {
        self.line.unwrap_or(0)
    }
}

/// Node classification
///
/// Closed set; every consumer matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Entry,
    Exit,
    Statement,
    Branch,
    TrueBranch,
    FalseBranch,
    LoopEntry,
    LoopExit,
    BlockBegin,
    BlockEnd,
    Converge,
}

impl NodeKind {
    /// Kinds without executable semantics, removed by simplification
    pub fn is_structural(&self) -> bool {
        match self {
            NodeKind::BlockBegin | NodeKind::BlockEnd | NodeKind::Converge => true,
            NodeKind::Entry
            | NodeKind::Exit
            | NodeKind::Statement
            | NodeKind::Branch
            | NodeKind::TrueBranch
            | NodeKind::FalseBranch
            | NodeKind::LoopEntry
            | NodeKind::LoopExit => false,
        }
    }

    /// Kinds kept on def-use paths for structural continuity
    pub fn is_passing(&self) -> bool {
        match self {
            NodeKind::LoopEntry
            | NodeKind::LoopExit
            | NodeKind::Branch
            | NodeKind::TrueBranch
            | NodeKind::FalseBranch => true,
            NodeKind::Entry
            | NodeKind::Exit
            | NodeKind::Statement
            | NodeKind::BlockBegin
            | NodeKind::BlockEnd
            | NodeKind::Converge => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Entry => "BEGIN",
            NodeKind::Exit => "EXIT",
            NodeKind::Statement => "STATEMENT",
            NodeKind::Branch => "BRANCH",
            NodeKind::TrueBranch => "TRUE",
            NodeKind::FalseBranch => "FALSE",
            NodeKind::LoopEntry => "LOOP_ENTRY",
            NodeKind::LoopExit => "LOOP_EXIT",
            NodeKind::BlockBegin => "BLOCK_BEGIN",
            NodeKind::BlockEnd => "BLOCK_END",
            NodeKind::Converge => "CONVERGE",
        }
    }
}

/// Code attached to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeCode {
    /// A simple statement (declaration, assignment, call, return, throw, jump)
    Stmt(Stmt),
    /// Branch condition or switch selector
    Condition(Expr),
    /// Iterable evaluated once before a for-each loop
    Iterate(Expr),
    /// Binding of a for-each element or catch parameter
    Bind { var: String, ty: TypeRef },
}

impl NodeCode {
    pub fn reads(&self) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        match self {
            NodeCode::Stmt(stmt) => match &stmt.kind {
                StmtKind::Local { init: Some(e), .. } => collect_reads(e, &mut out),
                StmtKind::Assign { target, value } => {
                    collect_target_reads(target, &mut out);
                    collect_reads(value, &mut out);
                }
                StmtKind::Expr { expr } | StmtKind::Throw { value: expr } => {
                    collect_reads(expr, &mut out)
                }
                StmtKind::Return { value: Some(e) } => collect_reads(e, &mut out),
                _ => {}
            },
            NodeCode::Condition(e) | NodeCode::Iterate(e) => collect_reads(e, &mut out),
            NodeCode::Bind { .. } => {}
        }
        out
    }

    pub fn writes(&self) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        match self {
            NodeCode::Stmt(stmt) => match &stmt.kind {
                StmtKind::Local { name, init, .. } => {
                    out.insert(VarId::Local(name.clone()));
                    if let Some(e) = init {
                        collect_writes(e, &mut out);
                    }
                }
                StmtKind::Assign { target, value } => {
                    if let Some(var) = written_var(target) {
                        out.insert(var);
                    }
                    collect_writes(value, &mut out);
                }
                StmtKind::Expr { expr } | StmtKind::Throw { value: expr } => {
                    collect_writes(expr, &mut out)
                }
                StmtKind::Return { value: Some(e) } => collect_writes(e, &mut out),
                _ => {}
            },
            NodeCode::Condition(e) | NodeCode::Iterate(e) => collect_writes(e, &mut out),
            NodeCode::Bind { var, .. } => {
                out.insert(VarId::Local(var.clone()));
            }
        }
        out
    }

    /// Top-level expressions evaluated by the node
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            NodeCode::Stmt(stmt) => crate::model::visit::stmt_exprs(stmt),
            NodeCode::Condition(e) | NodeCode::Iterate(e) => vec![e],
            NodeCode::Bind { .. } => Vec::new(),
        }
    }

    pub fn as_stmt(&self) -> Option<&Stmt> {
        match self {
            NodeCode::Stmt(stmt) => Some(stmt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build::*;

    #[test]
    fn test_node_kind_partitions() {
        assert!(NodeKind::Converge.is_structural());
        assert!(!NodeKind::Converge.is_passing());
        assert!(NodeKind::LoopEntry.is_passing());
        assert!(!NodeKind::Statement.is_structural());
        assert!(!NodeKind::Statement.is_passing());
    }

    #[test]
    fn test_local_declaration_defines_even_without_initializer() {
        let code = NodeCode::Stmt(local_decl(1, "x", TypeRef::object("Foo"), None));
        assert!(code.writes().contains(&VarId::Local("x".into())));
        assert!(code.reads().is_empty());
    }

    #[test]
    fn test_call_statement_reads_receiver_and_args() {
        let call = call(
            Some(local_ref("x", TypeRef::object("Foo"))),
            "foo(java.lang.String)",
            vec![param_ref("p", TypeRef::string())],
            TypeRef::Void,
        );
        let code = NodeCode::Stmt(expr_stmt(2, call));
        let reads = code.reads();
        assert!(reads.contains(&VarId::Local("x".into())));
        assert!(reads.contains(&VarId::Param("p".into())));
    }

    #[test]
    fn test_bind_defines_loop_variable() {
        let code = NodeCode::Bind {
            var: "item".into(),
            ty: TypeRef::object("Foo"),
        };
        assert_eq!(code.writes().into_iter().collect::<Vec<_>>(), vec![VarId::Local("item".into())]);
    }
}
