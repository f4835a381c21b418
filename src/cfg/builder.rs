//! CFG construction from executable bodies
//!
//! Every simple statement becomes one node. Compound statements expand into
//! the structural skeleton the path enumerator relies on:
//!
//! - `if`: BRANCH → TRUE → then … CONVERGE, BRANCH → FALSE → else … CONVERGE
//! - `while`/`for`: LOOP_ENTRY → BRANCH → TRUE → body → (back edge) LOOP_ENTRY,
//!   BRANCH → FALSE → LOOP_EXIT
//! - `do`: LOOP_ENTRY → body → BRANCH → TRUE → (back edge) LOOP_ENTRY
//! - for-each: iterable → LOOP_ENTRY → BRANCH → TRUE → bind → body → (back edge)
//! - `switch`: BRANCH → TRUE (one per case, with fall-through) … CONVERGE
//! - `try`: every statement of the body gets an exception edge to each handler
//!
//! Blocks are wrapped in BLOCK_BEGIN/BLOCK_END; those, and CONVERGE, are
//! removed again by [`simplify`](crate::cfg::simplify).

use crate::cfg::{Cfg, CfgEdge, CfgNode, EdgeType, NodeCode, NodeKind};
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::{Block, ExecutableDecl, Stmt, StmtKind};
use petgraph::graph::NodeIndex;

/// Nesting depth accepted before a body is declared unanalyzable
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Build the simplified CFG of an executable
///
/// Returns `None` when the executable has no body (abstract, native) or its
/// body cannot be modeled; callers treat that as "no analysis possible".
pub fn build_cfg(exec: &ExecutableDecl) -> Option<Cfg> {
    let body = exec.body.as_ref()?;
    match CfgBuilder::new().build(body) {
        Ok(raw) => Some(crate::cfg::simplify(&raw)),
        Err(e) => {
            tracing::warn!(executable = %exec.name, error = %e, "CFG construction failed");
            None
        }
    }
}

/// Jump targets of an enclosing loop or switch
struct JumpTarget {
    break_to: NodeIndex,
    /// Continue target and whether jumping there closes the loop
    continue_to: Option<(NodeIndex, bool)>,
}

/// Statement nodes covered by an enclosing `try`
struct HandlerFrame {
    handlers: Vec<NodeIndex>,
    covered: Vec<NodeIndex>,
}

/// CFG builder over the statement tree of one executable
pub struct CfgBuilder {
    graph: Cfg,
    exit: NodeIndex,
    jumps: Vec<JumpTarget>,
    handlers: Vec<HandlerFrame>,
    max_depth: usize,
}

impl Default for CfgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CfgBuilder {
    pub fn new() -> Self {
        Self {
            graph: Cfg::new(),
            exit: NodeIndex::end(),
            jumps: Vec::new(),
            handlers: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build the raw (unsimplified) CFG of a body
    pub fn build(mut self, body: &Block) -> AnalysisResult<Cfg> {
        let entry = self.add(NodeKind::Entry, None, None);
        self.exit = self.add(NodeKind::Exit, None, None);

        if let Some(end) = self.build_block(&body.stmts, entry, 0)? {
            self.connect(end, self.exit, EdgeType::Fallthrough);
        }

        Ok(self.graph)
    }

    fn add(&mut self, kind: NodeKind, stmt: Option<&Stmt>, code: Option<NodeCode>) -> NodeIndex {
        let id = self.graph.node_count();
        let idx = self.graph.add_node(CfgNode {
            id,
            kind,
            stmt: stmt.map(|s| s.id),
            line: stmt.map(|s| s.line),
            code,
        });
        if matches!(kind, NodeKind::Statement | NodeKind::Branch) {
            if let Some(frame) = self.handlers.last_mut() {
                frame.covered.push(idx);
            }
        }
        idx
    }

    fn connect(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeType) {
        self.graph.add_edge(from, to, CfgEdge::new(kind));
    }

    fn connect_back(&mut self, from: NodeIndex, to: NodeIndex) {
        self.graph.add_edge(from, to, CfgEdge::back(EdgeType::LoopBack));
    }

    /// Build a block; returns the node control falls out of, or `None` when
    /// every route leaves the block abruptly
    fn build_block(&mut self, stmts: &[Stmt], from: NodeIndex, depth: usize) -> AnalysisResult<Option<NodeIndex>> {
        let begin = self.add(NodeKind::BlockBegin, None, None);
        self.connect(from, begin, EdgeType::Fallthrough);

        let end = self.build_sequence(stmts, begin, depth)?;

        Ok(end.map(|last| {
            let block_end = self.add(NodeKind::BlockEnd, None, None);
            self.connect(last, block_end, EdgeType::Fallthrough);
            block_end
        }))
    }

    fn build_sequence(&mut self, stmts: &[Stmt], from: NodeIndex, depth: usize) -> AnalysisResult<Option<NodeIndex>> {
        let mut current = Some(from);
        for stmt in stmts {
            let Some(cur) = current else {
                tracing::trace!(line = stmt.line, "skipping unreachable statement");
                break;
            };
            current = self.build_stmt(stmt, cur, depth)?;
        }
        Ok(current)
    }

    fn build_stmt(&mut self, stmt: &Stmt, cur: NodeIndex, depth: usize) -> AnalysisResult<Option<NodeIndex>> {
        if depth > self.max_depth {
            return Err(AnalysisError::unanalyzable(
                format!("statement nesting deeper than {}", self.max_depth),
                stmt.line,
            ));
        }
        let depth = depth + 1;

        match &stmt.kind {
            StmtKind::Local { .. } | StmtKind::Assign { .. } | StmtKind::Expr { .. } => {
                let node = self.simple(stmt);
                self.connect(cur, node, EdgeType::Fallthrough);
                Ok(Some(node))
            }
            StmtKind::Return { .. } => {
                let node = self.simple(stmt);
                self.connect(cur, node, EdgeType::Fallthrough);
                self.connect(node, self.exit, EdgeType::Return);
                Ok(None)
            }
            StmtKind::Throw { .. } => {
                let node = self.simple(stmt);
                self.connect(cur, node, EdgeType::Fallthrough);
                // Covered statements already reach the handlers of their try
                if self.handlers.last().map_or(true, |f| f.handlers.is_empty()) {
                    self.connect(node, self.exit, EdgeType::Exception);
                }
                Ok(None)
            }
            StmtKind::Break => {
                let node = self.simple(stmt);
                self.connect(cur, node, EdgeType::Fallthrough);
                match self.jumps.last().map(|t| t.break_to) {
                    Some(target) => {
                        self.connect(node, target, EdgeType::Jump);
                        Ok(None)
                    }
                    None => {
                        tracing::debug!(line = stmt.line, "break outside loop or switch, treated as no-op");
                        Ok(Some(node))
                    }
                }
            }
            StmtKind::Continue => {
                let node = self.simple(stmt);
                self.connect(cur, node, EdgeType::Fallthrough);
                match self.jumps.iter().rev().find_map(|t| t.continue_to) {
                    Some((target, true)) => {
                        self.connect_back(node, target);
                        Ok(None)
                    }
                    Some((target, false)) => {
                        self.connect(node, target, EdgeType::Jump);
                        Ok(None)
                    }
                    None => {
                        tracing::debug!(line = stmt.line, "continue outside loop, treated as no-op");
                        Ok(Some(node))
                    }
                }
            }
            StmtKind::Block { body } => self.build_block(&body.stmts, cur, depth),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let branch = self.add(NodeKind::Branch, Some(stmt), Some(NodeCode::Condition(cond.clone())));
                self.connect(cur, branch, EdgeType::Fallthrough);

                let t = self.add(NodeKind::TrueBranch, Some(stmt), None);
                self.connect(branch, t, EdgeType::TrueBranch);
                let then_end = self.build_block(&then_branch.stmts, t, depth)?;

                let f = self.add(NodeKind::FalseBranch, Some(stmt), None);
                self.connect(branch, f, EdgeType::FalseBranch);
                let else_end = match else_branch {
                    Some(block) => self.build_block(&block.stmts, f, depth)?,
                    None => Some(f),
                };

                if then_end.is_none() && else_end.is_none() {
                    return Ok(None);
                }
                let converge = self.add(NodeKind::Converge, None, None);
                for end in [then_end, else_end].into_iter().flatten() {
                    self.connect(end, converge, EdgeType::Fallthrough);
                }
                Ok(Some(converge))
            }
            StmtKind::While { cond, body } => {
                let entry = self.add(NodeKind::LoopEntry, Some(stmt), None);
                self.connect(cur, entry, EdgeType::Fallthrough);
                let branch = self.add(NodeKind::Branch, Some(stmt), Some(NodeCode::Condition(cond.clone())));
                self.connect(entry, branch, EdgeType::Fallthrough);
                self.loop_body(stmt, branch, entry, (entry, true), |b, t| b.build_block(&body.stmts, t, depth))
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let Some(after_init) = self.build_sequence(init, cur, depth)? else {
                    return Ok(None);
                };
                let entry = self.add(NodeKind::LoopEntry, Some(stmt), None);
                self.connect(after_init, entry, EdgeType::Fallthrough);
                let branch = self.add(NodeKind::Branch, Some(stmt), cond.clone().map(NodeCode::Condition));
                self.connect(entry, branch, EdgeType::Fallthrough);

                // `continue` runs the update statements before looping
                let cont = self.add(NodeKind::Converge, None, None);
                let exit = self.loop_body(stmt, branch, entry, (cont, false), |b, t| {
                    let end = b.build_block(&body.stmts, t, depth)?;
                    if let Some(end) = end {
                        b.connect(end, cont, EdgeType::Fallthrough);
                    }
                    Ok(None)
                })?;
                if let Some(upd_end) = self.build_sequence(update, cont, depth)? {
                    self.connect_back(upd_end, entry);
                }
                Ok(exit)
            }
            StmtKind::ForEach { var, ty, iterable, body } => {
                let iter = self.add(NodeKind::Statement, Some(stmt), Some(NodeCode::Iterate(iterable.clone())));
                self.connect(cur, iter, EdgeType::Fallthrough);
                let entry = self.add(NodeKind::LoopEntry, Some(stmt), None);
                self.connect(iter, entry, EdgeType::Fallthrough);
                let branch = self.add(NodeKind::Branch, Some(stmt), None);
                self.connect(entry, branch, EdgeType::Fallthrough);
                let bind_code = NodeCode::Bind {
                    var: var.clone(),
                    ty: ty.clone(),
                };
                self.loop_body(stmt, branch, entry, (entry, true), |b, t| {
                    let bind = b.add(NodeKind::Statement, Some(stmt), Some(bind_code));
                    b.connect(t, bind, EdgeType::Fallthrough);
                    b.build_block(&body.stmts, bind, depth)
                })
            }
            StmtKind::DoWhile { body, cond } => {
                let entry = self.add(NodeKind::LoopEntry, Some(stmt), None);
                self.connect(cur, entry, EdgeType::Fallthrough);
                let branch = self.add(NodeKind::Branch, Some(stmt), Some(NodeCode::Condition(cond.clone())));
                let exit = self.add(NodeKind::LoopExit, Some(stmt), None);

                self.jumps.push(JumpTarget {
                    break_to: exit,
                    continue_to: Some((branch, false)),
                });
                let body_end = self.build_block(&body.stmts, entry, depth);
                self.jumps.pop();
                if let Some(end) = body_end? {
                    self.connect(end, branch, EdgeType::Fallthrough);
                }

                let t = self.add(NodeKind::TrueBranch, Some(stmt), None);
                self.connect(branch, t, EdgeType::TrueBranch);
                self.connect_back(t, entry);
                let f = self.add(NodeKind::FalseBranch, Some(stmt), None);
                self.connect(branch, f, EdgeType::FalseBranch);
                self.connect(f, exit, EdgeType::LoopExit);
                Ok(Some(exit))
            }
            StmtKind::Switch { selector, cases } => {
                let branch = self.add(NodeKind::Branch, Some(stmt), Some(NodeCode::Condition(selector.clone())));
                self.connect(cur, branch, EdgeType::Fallthrough);
                let converge = self.add(NodeKind::Converge, None, None);

                self.jumps.push(JumpTarget {
                    break_to: converge,
                    continue_to: None,
                });
                let mut previous_end: Option<NodeIndex> = None;
                let mut result = Ok(());
                for case in cases {
                    let label = self.add(NodeKind::TrueBranch, Some(stmt), None);
                    self.connect(branch, label, EdgeType::TrueBranch);
                    if let Some(end) = previous_end {
                        self.connect(end, label, EdgeType::Fallthrough);
                    }
                    match self.build_block(&case.body.stmts, label, depth) {
                        Ok(end) => previous_end = end,
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    }
                }
                self.jumps.pop();
                result?;

                if let Some(end) = previous_end {
                    self.connect(end, converge, EdgeType::Fallthrough);
                }
                if !cases.iter().any(|c| c.labels.is_empty()) {
                    let f = self.add(NodeKind::FalseBranch, Some(stmt), None);
                    self.connect(branch, f, EdgeType::FalseBranch);
                    self.connect(f, converge, EdgeType::Fallthrough);
                }
                Ok(Some(converge))
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                let handlers: Vec<NodeIndex> = catches
                    .iter()
                    .map(|c| {
                        self.add(
                            NodeKind::Statement,
                            Some(stmt),
                            Some(NodeCode::Bind {
                                var: c.param.clone(),
                                ty: c.ty.clone(),
                            }),
                        )
                    })
                    .collect();

                self.handlers.push(HandlerFrame {
                    handlers: handlers.clone(),
                    covered: Vec::new(),
                });
                let body_end = self.build_block(&body.stmts, cur, depth);
                let frame = self.handlers.pop();
                let body_end = body_end?;

                if let Some(frame) = frame {
                    for &node in &frame.covered {
                        for &handler in &frame.handlers {
                            self.graph.add_edge(node, handler, CfgEdge::new(EdgeType::Exception));
                        }
                    }
                }

                let converge = self.add(NodeKind::Converge, None, None);
                let mut falls_through = false;
                if let Some(end) = body_end {
                    self.connect(end, converge, EdgeType::Fallthrough);
                    falls_through = true;
                }
                for (clause, &handler) in catches.iter().zip(&handlers) {
                    if let Some(end) = self.build_block(&clause.body.stmts, handler, depth)? {
                        self.connect(end, converge, EdgeType::Fallthrough);
                        falls_through = true;
                    }
                }

                if !falls_through {
                    return Ok(None);
                }
                match finally {
                    Some(block) => self.build_block(&block.stmts, converge, depth),
                    None => Ok(Some(converge)),
                }
            }
        }
    }

    fn simple(&mut self, stmt: &Stmt) -> NodeIndex {
        self.add(NodeKind::Statement, Some(stmt), Some(NodeCode::Stmt(stmt.clone())))
    }

    /// Shared loop tail: TRUE → body, FALSE → LOOP_EXIT, back edge to `entry`
    fn loop_body<F>(
        &mut self,
        stmt: &Stmt,
        branch: NodeIndex,
        entry: NodeIndex,
        continue_to: (NodeIndex, bool),
        build: F,
    ) -> AnalysisResult<Option<NodeIndex>>
    where
        F: FnOnce(&mut Self, NodeIndex) -> AnalysisResult<Option<NodeIndex>>,
    {
        let exit = self.add(NodeKind::LoopExit, Some(stmt), None);

        let t = self.add(NodeKind::TrueBranch, Some(stmt), None);
        self.connect(branch, t, EdgeType::TrueBranch);
        self.jumps.push(JumpTarget {
            break_to: exit,
            continue_to: Some(continue_to),
        });
        let body_end = build(self, t);
        self.jumps.pop();
        if let Some(end) = body_end? {
            self.connect_back(end, entry);
        }

        let f = self.add(NodeKind::FalseBranch, Some(stmt), None);
        self.connect(branch, f, EdgeType::FalseBranch);
        self.connect(f, exit, EdgeType::LoopExit);
        Ok(Some(exit))
    }
}
