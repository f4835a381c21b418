//! CFG export to DOT and JSON formats

use crate::cfg::{Cfg, EdgeType, NodeCode, NodeKind};
use crate::model::{BinaryOp, Expr, ExprKind, StmtKind, UnaryOp};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Export CFG to DOT format for Graphviz
pub fn export_dot(cfg: &Cfg) -> String {
    let mut dot = String::from("digraph CFG {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box, style=rounded];\n\n");

    for node_idx in cfg.node_indices() {
        let node = &cfg[node_idx];
        let mut label = format!("{} {}", node.id, node.kind.label());
        if let Some(line) = node.line {
            write!(label, " (line {})", line).ok();
        }
        if let Some(code) = &node.code {
            write!(label, "\\n{}", code_summary(code)).ok();
        }

        let style = match node.kind {
            NodeKind::Entry => "fillcolor=lightgreen, style=filled",
            NodeKind::Exit => "fillcolor=lightcoral, style=filled",
            NodeKind::LoopEntry => "fillcolor=lightblue, style=filled",
            _ => "",
        };

        writeln!(
            dot,
            "  \"{}\" [label=\"{}\" {}];",
            node_idx.index(),
            escape_dot_string(&label),
            style
        )
        .ok();
    }

    dot.push('\n');
    for edge_idx in cfg.edge_indices() {
        let (Some((from, to)), Some(edge)) = (cfg.edge_endpoints(edge_idx), cfg.edge_weight(edge_idx)) else {
            continue;
        };
        let label = edge.kind.dot_label();
        let label_attr = if label.is_empty() {
            String::new()
        } else {
            format!(", label=\"{}\"", label)
        };

        writeln!(
            dot,
            "  \"{}\" -> \"{}\" [color={}, style={}{}];",
            from.index(),
            to.index(),
            edge.kind.dot_color(),
            if edge.kind == EdgeType::Fallthrough {
                "dashed"
            } else {
                "solid"
            },
            label_attr
        )
        .ok();
    }

    dot.push_str("}\n");
    dot
}

fn escape_dot_string(s: &str) -> String {
    s.replace('"', "\\\"")
}

/// One-line rendering of the code attached to a node
pub fn code_summary(code: &NodeCode) -> String {
    match code {
        NodeCode::Stmt(stmt) => match &stmt.kind {
            StmtKind::Local { name, ty, init } => match init {
                Some(e) => format!("{} {} = {}", ty, name, render_expr(e)),
                None => format!("{} {}", ty, name),
            },
            StmtKind::Assign { target, value } => {
                format!("{} = {}", render_expr(target), render_expr(value))
            }
            StmtKind::Expr { expr } => render_expr(expr),
            StmtKind::Return { value: Some(e) } => format!("return {}", render_expr(e)),
            StmtKind::Return { value: None } => "return".to_string(),
            StmtKind::Throw { value } => format!("throw {}", render_expr(value)),
            StmtKind::Break => "break".to_string(),
            StmtKind::Continue => "continue".to_string(),
            _ => "<compound>".to_string(),
        },
        NodeCode::Condition(e) => render_expr(e),
        NodeCode::Iterate(e) => format!("iterate {}", render_expr(e)),
        NodeCode::Bind { var, ty } => format!("{} {}", ty, var),
    }
}

/// Source-like rendering of an expression
pub fn render_expr(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Literal { value } => value.to_string(),
        ExprKind::Local { name } | ExprKind::Param { name } => name.clone(),
        ExprKind::Field { receiver: None, name } => name.clone(),
        ExprKind::Field {
            receiver: Some(r),
            name,
        } => format!("{}.{}", render_expr(r), name),
        ExprKind::This => "this".to_string(),
        ExprKind::TypeAccess { name } => short_name(name).to_string(),
        ExprKind::ArrayAccess { array, index } => {
            format!("{}[{}]", render_expr(array), render_expr(index))
        }
        ExprKind::Invoke {
            receiver,
            method,
            args,
            ..
        } => {
            let name = method.split('(').next().unwrap_or(method);
            let name = name.rsplit('.').next().unwrap_or(name);
            let args = args.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            match receiver {
                Some(r) => format!("{}.{}({})", render_expr(r), name, args),
                None => format!("{}({})", name, args),
            }
        }
        ExprKind::New { class, args } => format!(
            "new {}({})",
            short_name(class),
            args.iter().map(render_expr).collect::<Vec<_>>().join(", ")
        ),
        ExprKind::NewArray { .. } => format!("new {}", expr.ty),
        ExprKind::Unary { op, operand } => {
            let operand = render_expr(operand);
            match op {
                UnaryOp::Not => format!("!{}", operand),
                UnaryOp::Neg => format!("-{}", operand),
                UnaryOp::Plus => format!("+{}", operand),
                UnaryOp::BitNot => format!("~{}", operand),
                UnaryOp::PreInc => format!("++{}", operand),
                UnaryOp::PreDec => format!("--{}", operand),
                UnaryOp::PostInc => format!("{}++", operand),
                UnaryOp::PostDec => format!("{}--", operand),
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            format!("{} {} {}", render_expr(lhs), binary_symbol(*op), render_expr(rhs))
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => format!(
            "{} ? {} : {}",
            render_expr(cond),
            render_expr(then_expr),
            render_expr(else_expr)
        ),
        ExprKind::Cast { operand } => format!("({}) {}", expr.ty, render_expr(operand)),
        ExprKind::InstanceOf { operand, class } => {
            format!("{} instanceof {}", render_expr(operand), short_name(class))
        }
        ExprKind::Assign { target, value } => {
            format!("{} = {}", render_expr(target), render_expr(value))
        }
        ExprKind::Lambda => "<lambda>".to_string(),
    }
}

fn short_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::UShr => ">>>",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
    }
}

/// Complete CFG export for JSON serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CFGExport {
    pub executable: String,
    pub entry: Option<usize>,
    pub exit: Option<usize>,
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExport {
    pub id: usize,
    pub kind: String,
    pub line: Option<u32>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeExport {
    pub from: usize,
    pub to: usize,
    pub kind: String,
    pub back_edge: bool,
}

/// Export CFG to JSON format
///
/// Node and edge endpoints use the stable node ids, not graph indices.
pub fn export_json(cfg: &Cfg, executable: &str) -> CFGExport {
    use crate::cfg::analysis;

    let entry = analysis::find_entry(cfg).map(|idx| cfg[idx].id);
    let exit = analysis::find_exit(cfg).map(|idx| cfg[idx].id);

    let nodes = cfg
        .node_weights()
        .map(|node| NodeExport {
            id: node.id,
            kind: node.kind.label().to_string(),
            line: node.line,
            code: node.code.as_ref().map(code_summary),
        })
        .collect();

    let edges = cfg
        .edge_indices()
        .filter_map(|idx| {
            let (from, to) = cfg.edge_endpoints(idx)?;
            let edge = cfg.edge_weight(idx)?;
            Some(EdgeExport {
                from: cfg[from].id,
                to: cfg[to].id,
                kind: format!("{:?}", edge.kind),
                back_edge: edge.back_edge,
            })
        })
        .collect();

    CFGExport {
        executable: executable.to_string(),
        entry,
        exit,
        nodes,
        edges,
    }
}
