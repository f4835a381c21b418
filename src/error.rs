//! Engine error taxonomy
//!
//! None of these are fatal to a run. The orchestrator logs them and skips the
//! affected executable or path; the worst outcome is a score that is too low.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Body or node cannot be resolved (abstract method, missing node)
    #[error("model gap in {signature}: {reason}")]
    ModelGap { signature: String, reason: String },

    /// Re-entrant analysis through mutual recursion or self reference
    #[error("analysis cycle through {signature}")]
    AnalysisCycle { signature: String },

    /// Statement shape the engine does not model
    #[error("unanalyzable construct at line {line}: {construct}")]
    Unanalyzable { construct: String, line: u32 },

    #[error("node {node} not found in CFG of {signature}")]
    NodeNotFound { signature: String, node: String },
}

impl AnalysisError {
    pub fn model_gap(signature: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::ModelGap {
            signature: signature.into(),
            reason: reason.into(),
        }
    }

    pub fn unanalyzable(construct: impl Into<String>, line: u32) -> Self {
        AnalysisError::Unanalyzable {
            construct: construct.into(),
            line,
        }
    }

    /// Short category name used in logs and reports
    pub fn category(&self) -> &'static str {
        match self {
            AnalysisError::ModelGap { .. } => "ModelGap",
            AnalysisError::AnalysisCycle { .. } => "AnalysisCycle",
            AnalysisError::Unanalyzable { .. } => "Unanalyzable",
            AnalysisError::NodeNotFound { .. } => "NodeNotFound",
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
