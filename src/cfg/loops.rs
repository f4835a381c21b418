//! Loop structure: loop-entry subgraphs and natural loop detection
//!
//! Used for diagnostics only. Path enumeration bounds loops on its own and
//! does not depend on anything computed here.

use crate::cfg::analysis::find_entry;
use crate::cfg::{Cfg, NodeKind};
use petgraph::algo::dominators::simple_fast;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::BTreeSet;

/// Minimal subgraph of one loop, anchored at its LOOP_ENTRY node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSubgraph {
    /// The loop-entry node
    pub entry: NodeIndex,
    /// The TRUE successor of the loop condition, if the loop has one
    pub true_branch: Option<NodeIndex>,
    /// Entry, true successor and every node on the chain back to the entry
    pub nodes: BTreeSet<NodeIndex>,
    /// Edges closing the loop (tail, entry)
    pub back_edges: Vec<(NodeIndex, NodeIndex)>,
}

impl LoopSubgraph {
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Materialize the subgraph as a standalone CFG
    pub fn to_cfg(&self, cfg: &Cfg) -> Cfg {
        cfg.filter_map(
            |idx, node| self.nodes.contains(&idx).then(|| node.clone()),
            |_, edge| Some(*edge),
        )
    }
}

/// Build the loop subgraph for a LOOP_ENTRY node
///
/// Returns None when `entry` is not a loop entry or nothing loops back to it.
pub fn loop_subgraph(cfg: &Cfg, entry: NodeIndex) -> Option<LoopSubgraph> {
    if cfg.node_weight(entry)?.kind != NodeKind::LoopEntry {
        return None;
    }

    let back_edges: Vec<(NodeIndex, NodeIndex)> = cfg
        .edges_directed(entry, Direction::Incoming)
        .filter(|e| e.weight().back_edge)
        .map(|e| (e.source(), entry))
        .collect();
    if back_edges.is_empty() {
        return None;
    }

    let mut nodes = BTreeSet::new();
    for &(tail, _) in &back_edges {
        nodes.extend(compute_loop_body(cfg, entry, tail));
    }

    let loop_stmt = cfg[entry].stmt;
    let candidates: Vec<NodeIndex> = nodes
        .iter()
        .copied()
        .filter(|&n| cfg[n].kind == NodeKind::TrueBranch)
        .filter(|&n| {
            cfg.neighbors_directed(n, Direction::Incoming)
                .any(|p| cfg[p].kind == NodeKind::Branch && nodes.contains(&p))
        })
        .collect();
    let true_branch = candidates
        .iter()
        .copied()
        .find(|&n| cfg[n].stmt == loop_stmt)
        .or_else(|| candidates.first().copied());

    Some(LoopSubgraph {
        entry,
        true_branch,
        nodes,
        back_edges,
    })
}

/// Loop subgraphs for every LOOP_ENTRY node, in node order
pub fn loop_subgraphs(cfg: &Cfg) -> Vec<LoopSubgraph> {
    cfg.node_indices()
        .filter(|&n| cfg[n].kind == NodeKind::LoopEntry)
        .filter_map(|n| loop_subgraph(cfg, n))
        .collect()
}

/// Loop found from dominance alone, without consulting node kinds
///
/// Cross-checks `loop_subgraphs`: each `while`/`for`/`do` header the builder
/// emits should also show up here.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    pub header: NodeIndex,
    /// (tail, header)
    pub back_edge: (NodeIndex, NodeIndex),
    pub body: BTreeSet<NodeIndex>,
}

impl NaturalLoop {
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Number of other loops whose body holds this header
    pub fn nesting_level(&self, all_loops: &[NaturalLoop]) -> usize {
        all_loops
            .iter()
            .filter(|outer| outer.header != self.header && outer.body.contains(&self.header))
            .map(|outer| outer.nesting_level(all_loops) + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Every edge whose target dominates its source closes a natural loop
pub fn detect_natural_loops(cfg: &Cfg) -> Vec<NaturalLoop> {
    let Some(entry) = find_entry(cfg) else {
        return Vec::new();
    };
    let doms = simple_fast(cfg, entry);

    cfg.edge_references()
        .filter(|e| {
            doms.dominators(e.source())
                .is_some_and(|mut chain| chain.any(|d| d == e.target()))
        })
        .map(|e| NaturalLoop {
            header: e.target(),
            back_edge: (e.source(), e.target()),
            body: compute_loop_body(cfg, e.target(), e.source()),
        })
        .collect()
}

// Header plus everything that reaches `tail` backwards without crossing the header.
fn compute_loop_body(cfg: &Cfg, header: NodeIndex, tail: NodeIndex) -> BTreeSet<NodeIndex> {
    let mut body = BTreeSet::from([header]);
    let mut stack = vec![tail];
    while let Some(node) = stack.pop() {
        if body.insert(node) {
            stack.extend(cfg.neighbors_directed(node, Direction::Incoming));
        }
    }
    body
}
