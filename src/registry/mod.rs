// Registries holding the state of one analysis run

pub mod chooser;
pub mod class;
pub mod method;
pub mod signature;

pub use chooser::{normalize, WeightedChooser};
pub use class::ClassRegistry;
pub use method::{CandidateSite, MethodRecord, MethodRegistry, MethodState, DEFAULT_BASELINE};
pub use signature::{ExactMatcher, MatcherKind, Signature, SignatureMatcher, SubstringMatcher};
