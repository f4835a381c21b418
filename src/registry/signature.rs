//! Executable signatures and call-site matching

use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Interned executable signature
///
/// Cheap to clone; equality and ordering are by string value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(Arc<str>);

impl Signature {
    pub fn new(s: &str) -> Self {
        Signature(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Method name without class qualifier or parameter list
    pub fn simple_name(&self) -> &str {
        let head = self.0.split('(').next().unwrap_or(&self.0);
        head.rsplit('.').next().unwrap_or(head)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Borrow<str> for Signature {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Signature {
    fn from(s: &str) -> Self {
        Signature::new(s)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Decides whether a call-site signature denotes a known executable
pub trait SignatureMatcher: Send + Sync {
    fn matches(&self, candidate: &str, known: &str) -> bool;

    fn name(&self) -> &'static str;
}

/// Match when either string contains the other
///
/// Tolerates call sites rendered without package or class qualifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl SignatureMatcher for SubstringMatcher {
    fn matches(&self, candidate: &str, known: &str) -> bool {
        !candidate.is_empty() && (known.contains(candidate) || candidate.contains(known))
    }

    fn name(&self) -> &'static str {
        "substring"
    }
}

/// Match only identical strings
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl SignatureMatcher for ExactMatcher {
    fn matches(&self, candidate: &str, known: &str) -> bool {
        candidate == known
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

/// Matcher selection in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    #[default]
    Substring,
    Exact,
}

impl MatcherKind {
    pub fn build(self) -> Box<dyn SignatureMatcher> {
        match self {
            MatcherKind::Substring => Box::new(SubstringMatcher),
            MatcherKind::Exact => Box::new(ExactMatcher),
        }
    }
}
