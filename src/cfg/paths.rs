//! Backward and def-use path enumeration
//!
//! Paths are discovered by walking predecessors from a start node until a
//! terminating node: the entry, a loop entry, or an explicitly supplied stop
//! node. Traversal uses explicit stack frames, one per route, so deeply nested
//! bodies cannot exhaust the native stack.
//!
//! A path is stored as a stack: `nodes[0]` is the start node and the last
//! element is the terminus. [`Path::forward`] yields the nodes in execution
//! order, which is what the nullability propagator consumes.

use crate::cfg::{Cfg, NodeId, NodeKind};
use crate::model::VarId;
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Path through a CFG, from a start node back to its terminus
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Path {
    /// Unique identifier (BLAKE3 hash of the node id sequence)
    pub path_id: String,
    /// Graph indices, start first
    #[serde(skip)]
    pub nodes: Vec<NodeIndex>,
    /// Stable node ids, start first
    pub ids: Vec<NodeId>,
    pub kind: PathKind,
    pub start: NodeId,
    pub terminus: NodeId,
}

impl Path {
    pub fn new(cfg: &Cfg, nodes: Vec<NodeIndex>, kind: PathKind) -> Self {
        let ids: Vec<NodeId> = nodes.iter().map(|&n| cfg[n].id).collect();
        let start = ids.first().copied().unwrap_or(0);
        let terminus = ids.last().copied().unwrap_or(0);
        let path_id = hash_path(&ids);

        Self {
            path_id,
            nodes,
            ids,
            kind,
            start,
            terminus,
        }
    }

    /// Number of nodes on the path
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in execution order, terminus first, start last
    pub fn forward(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes.iter().rev().copied()
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.nodes.contains(&node)
    }
}

/// How a path was enumerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PathKind {
    /// Every predecessor on the route is kept
    Backward,
    /// Only definitions of related variables and passing nodes are kept
    DefUse,
}

/// Configurable limits for path enumeration
///
/// Prevents exponential explosion of paths in complex CFGs and
/// ensures termination in the presence of loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PathLimits {
    /// Maximum number of nodes per path
    pub max_length: usize,
    /// Maximum number of routes followed to completion
    pub max_paths: usize,
    /// Extra times a node may reappear on one route
    pub loop_unroll_limit: usize,
}

impl Default for PathLimits {
    fn default() -> Self {
        Self {
            max_length: 1000,
            max_paths: 10000,
            loop_unroll_limit: 1,
        }
    }
}

impl PathLimits {
    /// Create new path limits with custom values
    pub fn new(max_length: usize, max_paths: usize, loop_unroll_limit: usize) -> Self {
        Self {
            max_length,
            max_paths,
            loop_unroll_limit,
        }
    }

    /// Create limits with a custom maximum path length
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Create limits with a custom maximum path count
    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = max_paths;
        self
    }

    /// Create limits with a custom loop unroll limit
    pub fn with_loop_unroll_limit(mut self, loop_unroll_limit: usize) -> Self {
        self.loop_unroll_limit = loop_unroll_limit;
        self
    }
}

/// Compute BLAKE3 hash of a node id sequence
///
/// The hash includes the path length to prevent collisions between
/// different sequences that might otherwise hash to the same value.
pub fn hash_path(ids: &[NodeId]) -> String {
    let mut hasher = blake3::Hasher::new();

    hasher.update(&ids.len().to_le_bytes());

    for &id in ids {
        hasher.update(&id.to_le_bytes());
    }

    hasher.finalize().to_hex().to_string()
}

/// Enumerate every maximal backward path from `start`
///
/// Returns the deduplicated set of routes. A start node that is itself
/// terminal yields the single path `[start]`. An unknown start node yields no
/// paths.
pub fn backward_paths(cfg: &Cfg, start: NodeIndex, stop: Option<NodeIndex>, limits: &PathLimits) -> Vec<Path> {
    enumerate(cfg, start, stop, limits, PathKind::Backward, (), |_, _, _| Step::Push)
}

/// Enumerate def-use paths from `start`
///
/// The related set starts as the variables read but not written at `start`.
/// A predecessor is kept when it defines a related variable (which is then
/// replaced by the variables it reads), when it is a branch reading a related
/// variable, or when it is a passing node. A route ends early once a
/// definition leaves nothing related.
pub fn def_use_paths(cfg: &Cfg, start: NodeIndex, stop: Option<NodeIndex>, limits: &PathLimits) -> Vec<Path> {
    let Some(node) = cfg.node_weight(start) else {
        tracing::warn!(node = start.index(), "def-use enumeration from unknown node");
        return Vec::new();
    };
    let writes = node.writes();
    let related: BTreeSet<VarId> = node.reads().into_iter().filter(|v| !writes.contains(v)).collect();

    enumerate(cfg, start, stop, limits, PathKind::DefUse, related, def_use_step)
}

fn def_use_step(cfg: &Cfg, n: NodeIndex, related: &mut BTreeSet<VarId>) -> Step {
    let node = &cfg[n];
    let writes = node.writes();
    if writes.iter().any(|v| related.contains(v)) {
        for v in &writes {
            related.remove(v);
        }
        related.extend(node.reads());
        if related.is_empty() {
            return Step::Finish;
        }
        return Step::Push;
    }

    if node.kind == NodeKind::Branch {
        let reads = node.reads();
        if reads.iter().any(|v| related.contains(v)) {
            related.extend(reads);
            return Step::Push;
        }
    }

    if node.kind.is_passing() {
        Step::Push
    } else {
        Step::Pass
    }
}

/// What to do with a predecessor reached on a route
enum Step {
    /// Keep it on the path and continue
    Push,
    /// Walk through it without keeping it
    Pass,
    /// Keep it and end the route here
    Finish,
}

struct Frame<S> {
    node: NodeIndex,
    path: Vec<NodeIndex>,
    visits: HashMap<NodeIndex, usize>,
    state: S,
}

struct Collector<'a> {
    cfg: &'a Cfg,
    kind: PathKind,
    seen: HashSet<Vec<NodeIndex>>,
    paths: Vec<Path>,
    routes: usize,
}

impl Collector<'_> {
    fn emit(&mut self, nodes: Vec<NodeIndex>) {
        self.routes += 1;
        if self.seen.insert(nodes.clone()) {
            self.paths.push(Path::new(self.cfg, nodes, self.kind));
        }
    }
}

fn is_terminal(cfg: &Cfg, node: NodeIndex, stop: Option<NodeIndex>) -> bool {
    stop == Some(node) || matches!(cfg[node].kind, NodeKind::Entry | NodeKind::LoopEntry)
}

fn predecessors(cfg: &Cfg, node: NodeIndex) -> Vec<NodeIndex> {
    let mut preds: Vec<NodeIndex> = cfg.neighbors_directed(node, Direction::Incoming).collect();
    preds.sort_by_key(|n| n.index());
    preds.dedup();
    preds
}

fn enumerate<S, F>(
    cfg: &Cfg,
    start: NodeIndex,
    stop: Option<NodeIndex>,
    limits: &PathLimits,
    kind: PathKind,
    initial: S,
    step: F,
) -> Vec<Path>
where
    S: Clone,
    F: Fn(&Cfg, NodeIndex, &mut S) -> Step,
{
    if cfg.node_weight(start).is_none() {
        tracing::warn!(node = start.index(), "path enumeration from unknown node");
        return Vec::new();
    }

    let mut out = Collector {
        cfg,
        kind,
        seen: HashSet::new(),
        paths: Vec::new(),
        routes: 0,
    };
    let mut stack = vec![Frame {
        node: start,
        path: vec![start],
        visits: HashMap::from([(start, 1)]),
        state: initial,
    }];

    while let Some(frame) = stack.pop() {
        if out.routes >= limits.max_paths {
            tracing::debug!(start = cfg[start].id, routes = out.routes, "path budget exhausted");
            break;
        }

        if is_terminal(cfg, frame.node, stop) || frame.path.len() >= limits.max_length {
            out.emit(frame.path);
            continue;
        }

        let preds: Vec<NodeIndex> = predecessors(cfg, frame.node)
            .into_iter()
            .filter(|p| frame.visits.get(p).copied().unwrap_or(0) <= limits.loop_unroll_limit)
            .collect();
        if preds.is_empty() {
            out.emit(frame.path);
            continue;
        }

        // Reverse so the lowest-index predecessor is explored first
        for &pred in preds.iter().rev() {
            let mut next = Frame {
                node: pred,
                path: frame.path.clone(),
                visits: frame.visits.clone(),
                state: frame.state.clone(),
            };
            *next.visits.entry(pred).or_insert(0) += 1;
            match step(cfg, pred, &mut next.state) {
                Step::Push => next.path.push(pred),
                Step::Pass => {}
                Step::Finish => {
                    next.path.push(pred);
                    out.emit(next.path);
                    continue;
                }
            }
            stack.push(next);
        }
    }

    out.paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{build_cfg, find_node_by_id, CfgEdge, CfgNode, EdgeType, NodeCode};
    use crate::model::build::*;
    use crate::model::{ExecutableDecl, Stmt, TypeRef, Visibility};

    fn node(id: usize, kind: NodeKind) -> CfgNode {
        CfgNode {
            id,
            kind,
            stmt: None,
            line: None,
            code: None,
        }
    }

    fn edge() -> CfgEdge {
        CfgEdge::new(EdgeType::Fallthrough)
    }

    /// entry -> a -> b -> exit
    fn create_linear_cfg() -> Cfg {
        let mut g = Cfg::new();
        let entry = g.add_node(node(0, NodeKind::Entry));
        let a = g.add_node(node(1, NodeKind::Statement));
        let b = g.add_node(node(2, NodeKind::Statement));
        let exit = g.add_node(node(3, NodeKind::Exit));
        g.add_edge(entry, a, edge());
        g.add_edge(a, b, edge());
        g.add_edge(b, exit, edge());
        g
    }

    /// entry -> branch -> {t, f} -> join -> exit
    fn create_diamond_cfg() -> Cfg {
        let mut g = Cfg::new();
        let entry = g.add_node(node(0, NodeKind::Entry));
        let branch = g.add_node(node(1, NodeKind::Branch));
        let t = g.add_node(node(2, NodeKind::TrueBranch));
        let f = g.add_node(node(3, NodeKind::FalseBranch));
        let join = g.add_node(node(4, NodeKind::Statement));
        let exit = g.add_node(node(5, NodeKind::Exit));
        g.add_edge(entry, branch, edge());
        g.add_edge(branch, t, CfgEdge::new(EdgeType::TrueBranch));
        g.add_edge(branch, f, CfgEdge::new(EdgeType::FalseBranch));
        g.add_edge(t, join, edge());
        g.add_edge(f, join, edge());
        g.add_edge(join, exit, edge());
        g
    }

    /// entry -> a -> b -> c -> a, with no loop-entry node to stop at
    fn create_headerless_cycle() -> Cfg {
        let mut g = Cfg::new();
        let entry = g.add_node(node(0, NodeKind::Entry));
        let a = g.add_node(node(1, NodeKind::Statement));
        let b = g.add_node(node(2, NodeKind::Statement));
        let c = g.add_node(node(3, NodeKind::Statement));
        g.add_edge(entry, a, edge());
        g.add_edge(a, b, edge());
        g.add_edge(b, c, edge());
        g.add_edge(c, a, CfgEdge::back(EdgeType::LoopBack));
        g
    }

    fn exec(stmts: Vec<Stmt>) -> ExecutableDecl {
        let mut m = method("m", Visibility::Public)
            .param("p", TypeRef::object("Foo"))
            .body(stmts)
            .build();
        if let Some(b) = m.body.as_mut() {
            b.number_statements();
        }
        m
    }

    fn node_at_line(cfg: &Cfg, line: u32) -> NodeIndex {
        cfg.node_indices()
            .find(|&n| cfg[n].line == Some(line) && cfg[n].code.is_some())
            .unwrap()
    }

    fn lines(cfg: &Cfg, path: &Path) -> Vec<u32> {
        path.nodes.iter().filter_map(|&n| cfg[n].line).collect()
    }

    fn obj() -> TypeRef {
        TypeRef::object("Foo")
    }

    fn foo_on(var: &str) -> crate::model::Expr {
        call_on(local_ref(var, obj()), "foo()", TypeRef::Void)
    }

    #[test]
    fn test_hash_path_deterministic() {
        assert_eq!(hash_path(&[0, 1, 2]), hash_path(&[0, 1, 2]));
        assert_ne!(hash_path(&[0, 1, 2]), hash_path(&[0, 2, 1]));
        assert_ne!(hash_path(&[]), hash_path(&[0]));
    }

    #[test]
    fn test_path_limits_builder() {
        let limits = PathLimits::default()
            .with_max_length(10)
            .with_max_paths(5)
            .with_loop_unroll_limit(2);
        assert_eq!(limits, PathLimits::new(10, 5, 2));
        assert_eq!(PathLimits::default().loop_unroll_limit, 1);
    }

    #[test]
    fn test_backward_linear() {
        let cfg = create_linear_cfg();
        let b = find_node_by_id(&cfg, 2).unwrap();
        let paths = backward_paths(&cfg, b, None, &PathLimits::default());
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].ids, vec![2, 1, 0]);
        assert_eq!(paths[0].start, 2);
        assert_eq!(paths[0].terminus, 0);
        assert_eq!(paths[0].forward().map(|n| cfg[n].id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_backward_diamond_has_two_routes() {
        let cfg = create_diamond_cfg();
        let join = find_node_by_id(&cfg, 4).unwrap();
        let paths = backward_paths(&cfg, join, None, &PathLimits::default());
        let ids: BTreeSet<Vec<NodeId>> = paths.iter().map(|p| p.ids.clone()).collect();
        assert_eq!(ids, [vec![4, 2, 1, 0], vec![4, 3, 1, 0]].into_iter().collect());
    }

    #[test]
    fn test_terminal_start_yields_single_node_path() {
        let cfg = create_linear_cfg();
        let entry = find_node_by_id(&cfg, 0).unwrap();
        let paths = backward_paths(&cfg, entry, None, &PathLimits::default());
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].ids, vec![0]);
    }

    #[test]
    fn test_stop_node_ends_route() {
        let cfg = create_linear_cfg();
        let b = find_node_by_id(&cfg, 2).unwrap();
        let a = find_node_by_id(&cfg, 1).unwrap();
        let paths = backward_paths(&cfg, b, Some(a), &PathLimits::default());
        assert_eq!(paths[0].ids, vec![2, 1]);
    }

    #[test]
    fn test_unknown_start_is_empty() {
        let cfg = create_linear_cfg();
        assert!(backward_paths(&cfg, NodeIndex::new(99), None, &PathLimits::default()).is_empty());
        assert!(def_use_paths(&cfg, NodeIndex::new(99), None, &PathLimits::default()).is_empty());
    }

    #[test]
    fn test_cycle_visits_each_node_at_most_twice() {
        let cfg = create_headerless_cycle();
        let b = find_node_by_id(&cfg, 2).unwrap();
        let paths = backward_paths(&cfg, b, None, &PathLimits::default());
        assert!(!paths.is_empty());
        for path in &paths {
            for n in cfg.node_indices() {
                assert!(path.nodes.iter().filter(|&&m| m == n).count() <= 2);
            }
        }
        assert!(paths.iter().any(|p| p.ids == vec![2, 1, 0]));
        assert!(paths.iter().any(|p| p.ids == vec![2, 1, 3, 2, 1, 0]));
    }

    #[test]
    fn test_unroll_limit_zero_forbids_revisits() {
        let cfg = create_headerless_cycle();
        let b = find_node_by_id(&cfg, 2).unwrap();
        let limits = PathLimits::default().with_loop_unroll_limit(0);
        for path in backward_paths(&cfg, b, None, &limits) {
            let distinct: HashSet<_> = path.nodes.iter().collect();
            assert_eq!(distinct.len(), path.len());
        }
    }

    #[test]
    fn test_max_paths_caps_routes() {
        let cfg = create_diamond_cfg();
        let join = find_node_by_id(&cfg, 4).unwrap();
        let paths = backward_paths(&cfg, join, None, &PathLimits::default().with_max_paths(1));
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_max_length_truncates() {
        let cfg = create_linear_cfg();
        let b = find_node_by_id(&cfg, 2).unwrap();
        let paths = backward_paths(&cfg, b, None, &PathLimits::default().with_max_length(2));
        assert_eq!(paths[0].ids, vec![2, 1]);
    }

    #[test]
    fn test_backward_stops_at_loop_entry() {
        let cfg = build_cfg(&exec(vec![while_stmt(1, bool_lit(true), vec![expr_stmt(2, foo_on("x"))])])).unwrap();
        let call = node_at_line(&cfg, 2);
        let paths = backward_paths(&cfg, call, None, &PathLimits::default());
        assert_eq!(paths.len(), 1);
        let terminus = *paths[0].nodes.last().unwrap();
        assert_eq!(cfg[terminus].kind, NodeKind::LoopEntry);
    }

    #[test]
    fn test_def_use_keeps_only_definitions() {
        // Foo x = new Foo(); int k = 0; x.foo();
        let cfg = build_cfg(&exec(vec![
            local_decl(1, "x", obj(), Some(new_object("Foo", vec![]))),
            local_decl(2, "k", TypeRef::int(), Some(int_lit(0))),
            expr_stmt(3, foo_on("x")),
        ]))
        .unwrap();
        let paths = def_use_paths(&cfg, node_at_line(&cfg, 3), None, &PathLimits::default());
        assert_eq!(paths.len(), 1);
        assert_eq!(lines(&cfg, &paths[0]), vec![3, 1]);
        assert_eq!(paths[0].kind, PathKind::DefUse);
    }

    #[test]
    fn test_def_use_follows_transitive_chain() {
        // Foo y = p; Foo x = y; x.foo();
        let cfg = build_cfg(&exec(vec![
            local_decl(1, "y", obj(), Some(param_ref("p", obj()))),
            local_decl(2, "x", obj(), Some(local_ref("y", obj()))),
            expr_stmt(3, foo_on("x")),
        ]))
        .unwrap();
        let paths = def_use_paths(&cfg, node_at_line(&cfg, 3), None, &PathLimits::default());
        assert_eq!(paths.len(), 1);
        assert_eq!(lines(&cfg, &paths[0]), vec![3, 2, 1]);
        let terminus = *paths[0].nodes.last().unwrap();
        assert_eq!(cfg[terminus].kind, NodeKind::Statement);
    }

    #[test]
    fn test_def_use_keeps_guarding_branch() {
        // Foo x = p; if (x != null) { x.foo(); }
        let cfg = build_cfg(&exec(vec![
            local_decl(1, "x", obj(), Some(param_ref("p", obj()))),
            if_stmt(2, ne(local_ref("x", obj()), null()), vec![expr_stmt(3, foo_on("x"))], None),
        ]))
        .unwrap();
        let paths = def_use_paths(&cfg, node_at_line(&cfg, 3), None, &PathLimits::default());
        assert_eq!(paths.len(), 1);
        let kinds: Vec<NodeKind> = paths[0].nodes.iter().map(|&n| cfg[n].kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Statement, NodeKind::TrueBranch, NodeKind::Branch, NodeKind::Statement]
        );
        assert!(matches!(cfg[paths[0].nodes[2]].code, Some(NodeCode::Condition(_))));
    }

    #[test]
    fn test_def_use_routes_through_both_arms() {
        // Foo x = null; if (c) { x = new Foo(); } x.foo();
        let cfg = build_cfg(&exec(vec![
            local_decl(1, "x", obj(), Some(null())),
            if_stmt(
                2,
                local_ref("c", TypeRef::boolean()),
                vec![assign(3, local_ref("x", obj()), new_object("Foo", vec![]))],
                None,
            ),
            expr_stmt(4, foo_on("x")),
        ]))
        .unwrap();
        let paths = def_use_paths(&cfg, node_at_line(&cfg, 4), None, &PathLimits::default());
        let routes: BTreeSet<Vec<u32>> = paths.iter().map(|p| lines(&cfg, p)).collect();
        assert!(routes.contains(&vec![4, 3]));
        assert!(routes.contains(&vec![4, 2, 2, 1]));
    }
}
