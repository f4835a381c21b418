//! Per-class NPE analysis
//!
//! The [`Analyzer`] runs the phases over an [`AnalysisContext`]; the other
//! modules provide the per-executable steps it sequences:
//!
//! - [`complexity`]: cyclomatic complexity
//! - [`returns`]: return nullability, recursive over in-scope callees
//! - [`sites`]: candidate dereference sites and their nullable path counts
//! - [`influence`]: parameters flowing into field writes
//! - [`score`]: the composite priority score

pub mod complexity;
pub mod context;
pub mod influence;
pub mod orchestrator;
pub mod returns;
pub mod score;
pub mod sites;

pub use complexity::cyclomatic_complexity;
pub use context::AnalysisContext;
pub use influence::influential_params;
pub use orchestrator::{AnalysisPhase, AnalysisReport, Analyzer, MethodReport};
pub use score::{base_score, compute_scores, ScoreWeights};
