// Nullpath: NPE-Candidate Analysis Engine
//
// Static analysis of a single target class for a search-based test
// generator. Builds statement-level CFGs, enumerates backward and def-use
// paths, infers field and literal nullability, and ranks methods by how
// likely they are to raise a null pointer exception.

pub mod analysis;
pub mod cfg;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod nullability;
pub mod output;
pub mod registry;

pub use analysis::{AnalysisPhase, AnalysisReport, Analyzer};
pub use config::{load_config, AnalysisConfig};
pub use error::{AnalysisError, AnalysisResult};
pub use model::{load_class_model, ClassModel};
pub use registry::{CandidateSite, Signature};
