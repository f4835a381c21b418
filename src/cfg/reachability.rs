//! Reachability analysis for CFGs

use crate::cfg::analysis::find_entry;
use crate::cfg::Cfg;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, Reversed};
use std::collections::BTreeSet;

/// Find all nodes reachable from the entry node
///
/// Returns all nodes that have a path from the entry.
/// For empty CFGs, returns an empty vec.
pub fn find_reachable(cfg: &Cfg) -> Vec<NodeIndex> {
    let entry = match find_entry(cfg) {
        Some(e) => e,
        None => return vec![],
    };

    let mut dfs = Dfs::new(cfg, entry);
    let mut reachable = Vec::new();

    while let Some(node) = dfs.next(cfg) {
        reachable.push(node);
    }

    reachable
}

/// Transitive closure of predecessors of `node`
///
/// The node itself is included only when it lies on a cycle. Used to find
/// literal-bearing statements that can execute before a candidate site.
pub fn reachable_nodes_backward(cfg: &Cfg, node: NodeIndex) -> BTreeSet<NodeIndex> {
    let mut result = BTreeSet::new();
    if cfg.node_weight(node).is_none() {
        tracing::debug!(node = node.index(), "backward reachability from unknown node");
        return result;
    }

    let reversed = Reversed(cfg);
    let mut dfs = Dfs::empty(reversed);
    for pred in cfg.neighbors_directed(node, petgraph::Direction::Incoming) {
        dfs.move_to(pred);
        while let Some(n) = dfs.next(reversed) {
            result.insert(n);
        }
    }

    result
}
