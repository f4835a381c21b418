//! Edge type classification for CFG edges

use serde::{Deserialize, Serialize};

/// Type of control flow edge between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    /// Conditional branch taken (true, or a switch case)
    TrueBranch,
    /// Conditional branch not taken (false)
    FalseBranch,
    /// Sequential fallthrough
    Fallthrough,
    /// Loop back to its entry
    LoopBack,
    /// Loop exit (condition false)
    LoopExit,
    /// Exception path into a catch handler or out of the executable
    Exception,
    /// `break` or a forward `continue`
    Jump,
    /// Explicit return to the exit node
    Return,
}

impl EdgeType {
    /// Color for DOT visualization
    pub fn dot_color(&self) -> &'static str {
        match self {
            EdgeType::TrueBranch => "green",
            EdgeType::FalseBranch => "red",
            EdgeType::Fallthrough => "black",
            EdgeType::LoopBack => "blue",
            EdgeType::LoopExit => "orange",
            EdgeType::Exception => "purple",
            EdgeType::Jump => "gray",
            EdgeType::Return => "darkgray",
        }
    }

    /// Label for DOT visualization
    pub fn dot_label(&self) -> &'static str {
        match self {
            EdgeType::TrueBranch => "T",
            EdgeType::FalseBranch => "F",
            EdgeType::Fallthrough => "",
            EdgeType::LoopBack => "loop",
            EdgeType::LoopExit => "exit",
            EdgeType::Exception => "throw",
            EdgeType::Jump => "jump",
            EdgeType::Return => "ret",
        }
    }
}

/// Edge weight: transition kind plus the back-edge flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CfgEdge {
    pub kind: EdgeType,
    /// Set when the edge closes a loop back to its loop entry
    pub back_edge: bool,
}

impl CfgEdge {
    pub fn new(kind: EdgeType) -> Self {
        Self {
            kind,
            back_edge: false,
        }
    }

    pub fn back(kind: EdgeType) -> Self {
        Self {
            kind,
            back_edge: true,
        }
    }

    /// Edge resulting from splicing `self` followed by `next`
    pub fn splice(self, next: CfgEdge) -> CfgEdge {
        let back_edge = self.back_edge || next.back_edge;
        let kind = if back_edge {
            EdgeType::LoopBack
        } else if self.kind == EdgeType::Fallthrough {
            next.kind
        } else {
            self.kind
        };
        CfgEdge { kind, back_edge }
    }
}
