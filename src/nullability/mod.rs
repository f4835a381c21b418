//! Nullability inference and propagation
//!
//! - [`fields`]: class-wide classification of fields
//! - [`literals`]: per-executable facts derived from `null` literals
//! - [`propagate`]: forward simulation of nullability along a path

pub mod fields;
pub mod literals;
pub mod propagate;

pub use fields::{classify_fields, FieldNullability, FieldTable};
pub use literals::{analyze_literals, NullArgument, NullLiteralSummary};
pub use propagate::{merge_facts, FactMap, Propagation, PropagationQuery, Propagator, ReturnOracle};
