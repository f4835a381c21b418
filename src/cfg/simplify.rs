//! CFG simplification
//!
//! Removes BLOCK_BEGIN, BLOCK_END and CONVERGE nodes by splicing their edges,
//! drops nodes unreachable from the entry, and routes dead ends to the exit.
//! Afterwards every node except entry and exit has at least one incoming and
//! one outgoing edge.

use crate::cfg::analysis::{find_entry, find_exit};
use crate::cfg::reachability::find_reachable;
use crate::cfg::{Cfg, CfgEdge, EdgeType};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Build the simplified copy of a raw CFG
pub fn simplify(raw: &Cfg) -> Cfg {
    let (Some(entry), Some(exit)) = (find_entry(raw), find_exit(raw)) else {
        return raw.clone();
    };

    let reachable: HashSet<NodeIndex> = find_reachable(raw).into_iter().collect();
    let keep = |n: NodeIndex| n == entry || n == exit || (reachable.contains(&n) && !raw[n].kind.is_structural());

    let mut simplified = Cfg::new();
    let mut mapping: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    for n in raw.node_indices().filter(|&n| keep(n)) {
        mapping.insert(n, simplified.add_node(raw[n].clone()));
    }

    let mut seen: HashSet<(NodeIndex, NodeIndex, bool)> = HashSet::new();
    for &(old, new) in sorted(&mapping).iter() {
        if !reachable.contains(&old) {
            continue;
        }
        for (target, edge) in spliced_successors(raw, old, &keep) {
            let Some(&to) = mapping.get(&target) else { continue };
            if seen.insert((new, to, edge.back_edge)) {
                simplified.add_edge(new, to, edge);
            }
        }
    }

    // Dead ends left by jumps into removed nodes
    let new_exit = mapping[&exit];
    let dead_ends: Vec<NodeIndex> = simplified
        .node_indices()
        .filter(|&n| n != new_exit)
        .filter(|&n| simplified.neighbors_directed(n, Direction::Outgoing).next().is_none())
        .collect();
    for n in dead_ends {
        tracing::trace!(node = simplified[n].id, "routing dead end to exit");
        simplified.add_edge(n, new_exit, CfgEdge::new(EdgeType::Fallthrough));
    }

    simplified
}

fn sorted(mapping: &HashMap<NodeIndex, NodeIndex>) -> Vec<(NodeIndex, NodeIndex)> {
    let mut pairs: Vec<_> = mapping.iter().map(|(&a, &b)| (a, b)).collect();
    pairs.sort_by_key(|(a, _)| a.index());
    pairs
}

/// Successors of `from` that survive simplification, with the edge obtained
/// by splicing through removed nodes
fn spliced_successors(
    raw: &Cfg,
    from: NodeIndex,
    keep: &dyn Fn(NodeIndex) -> bool,
) -> Vec<(NodeIndex, CfgEdge)> {
    let mut result = Vec::new();
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut stack: Vec<(NodeIndex, CfgEdge)> = raw
        .edges_directed(from, Direction::Outgoing)
        .map(|e| (e.target(), *e.weight()))
        .collect();
    stack.reverse();

    while let Some((node, edge)) = stack.pop() {
        if keep(node) {
            result.push((node, edge));
            continue;
        }
        if !visited.insert(node) {
            continue;
        }
        let mut next: Vec<(NodeIndex, CfgEdge)> = raw
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.target(), edge.splice(*e.weight())))
            .collect();
        next.reverse();
        stack.extend(next);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::builder::CfgBuilder;
    use crate::cfg::NodeKind;
    use crate::model::build::*;
    use crate::model::{Block, Stmt, TypeRef};

    fn simplified(stmts: Vec<Stmt>) -> Cfg {
        simplify(&CfgBuilder::new().build(&Block::new(stmts)).unwrap())
    }

    fn assert_connected_invariant(cfg: &Cfg) {
        for n in cfg.node_indices() {
            let kind = cfg[n].kind;
            if kind != NodeKind::Entry {
                assert!(
                    cfg.neighbors_directed(n, Direction::Incoming).next().is_some(),
                    "{:?} has no predecessor",
                    kind
                );
            }
            if kind != NodeKind::Exit {
                assert!(
                    cfg.neighbors_directed(n, Direction::Outgoing).next().is_some(),
                    "{:?} has no successor",
                    kind
                );
            }
        }
    }

    fn obj() -> TypeRef {
        TypeRef::object("Foo")
    }

    #[test]
    fn test_structural_nodes_removed() {
        let cfg = simplified(vec![
            if_stmt(1, bool_lit(true), vec![expr_stmt(2, int_lit(1))], None),
            block(3, vec![expr_stmt(4, int_lit(2))]),
        ]);
        assert!(cfg.node_weights().all(|n| !n.kind.is_structural()));
        assert_connected_invariant(&cfg);
    }

    #[test]
    fn test_back_edge_survives_splicing() {
        let cfg = simplified(vec![for_stmt(
            1,
            vec![local_decl(1, "i", TypeRef::int(), Some(int_lit(0)))],
            Some(bool_lit(true)),
            vec![],
            vec![expr_stmt(2, call_on(local_ref("x", obj()), "foo()", TypeRef::Void))],
        )]);
        let back: Vec<_> = cfg.edge_references().filter(|e| e.weight().back_edge).collect();
        assert_eq!(back.len(), 1);
        assert_eq!(cfg[back[0].target()].kind, NodeKind::LoopEntry);
        assert_connected_invariant(&cfg);
    }

    #[test]
    fn test_invariant_with_nested_control_flow() {
        let cfg = simplified(vec![
            local_decl(1, "x", obj(), None),
            while_stmt(
                2,
                bool_lit(true),
                vec![
                    if_stmt(3, bool_lit(true), vec![brk(4)], Some(vec![cont(5)])),
                ],
            ),
            switch_stmt(
                6,
                local_ref("k", TypeRef::int()),
                vec![(vec![int_lit(1)], vec![ret(7, None)]), (vec![], vec![brk(8)])],
            ),
            try_stmt(
                9,
                vec![throw(10, new_object("java.lang.IllegalStateException", vec![]))],
                vec![catch("e", TypeRef::object("java.lang.Exception"), vec![])],
                Some(vec![expr_stmt(11, int_lit(0))]),
            ),
            do_while(12, vec![expr_stmt(13, int_lit(1))], bool_lit(false)),
        ]);
        assert_connected_invariant(&cfg);
    }

    #[test]
    fn test_all_branches_return_leaves_no_orphans() {
        let cfg = simplified(vec![
            if_stmt(1, bool_lit(true), vec![ret(2, None)], Some(vec![ret(3, None)])),
            expr_stmt(4, int_lit(0)),
        ]);
        assert!(cfg.node_weights().all(|n| n.line != Some(4)));
        assert_connected_invariant(&cfg);
    }

    #[test]
    fn test_node_ids_preserved() {
        let raw = CfgBuilder::new()
            .build(&Block::new(vec![expr_stmt(1, int_lit(1))]))
            .unwrap();
        let raw_id = raw.node_weights().find(|n| n.line == Some(1)).unwrap().id;
        let cfg = simplify(&raw);
        let id = cfg.node_weights().find(|n| n.line == Some(1)).unwrap().id;
        assert_eq!(raw_id, id);
    }
}
