//! CFG analysis: entry/exit detection, node lookup, degree queries

use crate::cfg::{Cfg, NodeCode, NodeId, NodeKind};
use crate::model::{StmtId, StmtKind};
use petgraph::graph::NodeIndex;

/// Find the entry node of a CFG
///
/// Returns None if the CFG is empty.
pub fn find_entry(cfg: &Cfg) -> Option<NodeIndex> {
    cfg.node_indices().find(|&idx| cfg[idx].kind == NodeKind::Entry)
}

/// Find the exit node of a CFG
///
/// Returns, throws and normal completion all flow into the single exit.
pub fn find_exit(cfg: &Cfg) -> Option<NodeIndex> {
    cfg.node_indices().find(|&idx| cfg[idx].kind == NodeKind::Exit)
}

/// Find a node by its stable identifier
pub fn find_node_by_id(cfg: &Cfg, id: NodeId) -> Option<NodeIndex> {
    cfg.node_indices().find(|&idx| cfg[idx].id == id)
}

/// Find the node that evaluates a statement
///
/// Compound statements own several nodes; the one carrying code (the
/// condition, the iterable, the statement itself) is preferred.
pub fn find_node_by_stmt(cfg: &Cfg, stmt: StmtId) -> Option<NodeIndex> {
    let mut fallback = None;
    for idx in cfg.node_indices() {
        let node = &cfg[idx];
        if node.stmt != Some(stmt) {
            continue;
        }
        if node.code.is_some() {
            return Some(idx);
        }
        fallback.get_or_insert(idx);
    }
    fallback
}

/// Nodes that evaluate code, in node order
pub fn statement_nodes(cfg: &Cfg) -> Vec<NodeIndex> {
    cfg.node_indices()
        .filter(|&idx| match cfg[idx].kind {
            NodeKind::Statement | NodeKind::Branch => cfg[idx].code.is_some(),
            NodeKind::Entry
            | NodeKind::Exit
            | NodeKind::TrueBranch
            | NodeKind::FalseBranch
            | NodeKind::LoopEntry
            | NodeKind::LoopExit
            | NodeKind::BlockBegin
            | NodeKind::BlockEnd
            | NodeKind::Converge => false,
        })
        .collect()
}

/// `return` statement nodes, in node order
pub fn return_nodes(cfg: &Cfg) -> Vec<NodeIndex> {
    cfg.node_indices()
        .filter(|&idx| {
            matches!(
                cfg[idx].code.as_ref().and_then(NodeCode::as_stmt).map(|s| &s.kind),
                Some(StmtKind::Return { .. })
            )
        })
        .collect()
}

/// Count incoming edges to a node
pub fn in_degree(cfg: &Cfg, node: NodeIndex) -> usize {
    cfg.neighbors_directed(node, petgraph::Direction::Incoming).count()
}

/// Count outgoing edges from a node
pub fn out_degree(cfg: &Cfg, node: NodeIndex) -> usize {
    cfg.neighbors_directed(node, petgraph::Direction::Outgoing).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::builder::CfgBuilder;
    use crate::cfg::simplify;
    use crate::model::build::*;
    use crate::model::{Block, TypeRef};

    fn create_test_cfg() -> Cfg {
        // if (p == null) return null; return p;
        let p = || param_ref("p", TypeRef::object("Foo"));
        let mut body = Block::new(vec![
            if_stmt(1, eq(p(), null()), vec![ret(2, Some(null()))], None),
            ret(3, Some(p())),
        ]);
        body.number_statements();
        let raw = CfgBuilder::new().build(&body).unwrap();
        simplify(&raw)
    }

    #[test]
    fn test_find_entry_and_exit() {
        let cfg = create_test_cfg();
        assert_eq!(cfg[find_entry(&cfg).unwrap()].kind, NodeKind::Entry);
        assert_eq!(cfg[find_exit(&cfg).unwrap()].kind, NodeKind::Exit);
    }

    #[test]
    fn test_find_entry_empty_cfg() {
        let cfg = Cfg::new();
        assert!(find_entry(&cfg).is_none());
        assert!(find_exit(&cfg).is_none());
    }

    #[test]
    fn test_return_nodes() {
        let cfg = create_test_cfg();
        let lines: Vec<_> = return_nodes(&cfg).iter().map(|&n| cfg[n].line).collect();
        assert_eq!(lines, vec![Some(2), Some(3)]);
    }

    #[test]
    fn test_statement_nodes_include_branch() {
        let cfg = create_test_cfg();
        let kinds: Vec<_> = statement_nodes(&cfg).iter().map(|&n| cfg[n].kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == NodeKind::Branch).count(), 1);
        assert_eq!(kinds.len(), 3);
    }

    #[test]
    fn test_degrees() {
        let cfg = create_test_cfg();
        let branch = cfg.node_indices().find(|&n| cfg[n].kind == NodeKind::Branch).unwrap();
        assert_eq!(out_degree(&cfg, branch), 2);
        let exit = find_exit(&cfg).unwrap();
        assert_eq!(in_degree(&cfg, exit), 2);
    }

    #[test]
    fn test_find_node_by_stmt_prefers_code_node() {
        let cfg = create_test_cfg();
        let branch = cfg.node_indices().find(|&n| cfg[n].kind == NodeKind::Branch).unwrap();
        let stmt = cfg[branch].stmt.unwrap();
        assert_eq!(find_node_by_stmt(&cfg, stmt), Some(branch));
        assert_eq!(find_node_by_id(&cfg, cfg[branch].id), Some(branch));
    }
}
