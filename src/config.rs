//! Analysis configuration
//!
//! Every field has a default, so a config file only needs the keys it changes.

use crate::analysis::ScoreWeights;
use crate::cfg::builder::DEFAULT_MAX_DEPTH;
use crate::cfg::PathLimits;
use crate::registry::MatcherKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complexity above which path counts are estimated instead of enumerated
pub const DEFAULT_COMPLEXITY_PATH_CUTOFF: u32 = 15;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub limits: PathLimits,
    pub weights: ScoreWeights,
    pub complexity_path_cutoff: u32,
    /// Seed of the target chooser's generator
    pub seed: u64,
    pub matcher: MatcherKind,
    /// Let public constructors become targets too
    pub constructors_as_targets: bool,
    /// Statement nesting accepted by the CFG builder
    pub max_cfg_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            limits: PathLimits::default(),
            weights: ScoreWeights::default(),
            complexity_path_cutoff: DEFAULT_COMPLEXITY_PATH_CUTOFF,
            seed: DEFAULT_SEED,
            matcher: MatcherKind::default(),
            constructors_as_targets: false,
            max_cfg_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid analysis config JSON")
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_limits(mut self, limits: PathLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_matcher(mut self, matcher: MatcherKind) -> Self {
        self.matcher = matcher;
        self
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> Result<AnalysisConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    AnalysisConfig::from_json_str(&text).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = AnalysisConfig::from_json_str(r#"{"seed": 7, "limits": {"max_paths": 50}}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.limits.max_paths, 50);
        assert_eq!(config.limits.loop_unroll_limit, 1);
        assert_eq!(config.complexity_path_cutoff, DEFAULT_COMPLEXITY_PATH_CUTOFF);
        assert_eq!(config.weights, ScoreWeights::default());
    }

    #[test]
    fn test_matcher_and_weights_from_json() {
        let config = AnalysisConfig::from_json_str(
            r#"{"matcher": "exact", "weights": {"baseline": 0.5, "path_exponent": 2.0}}"#,
        )
        .unwrap();
        assert_eq!(config.matcher, MatcherKind::Exact);
        assert_eq!(config.weights.baseline, 0.5);
        assert_eq!(config.weights.path_exponent, 2.0);
        assert_eq!(config.weights.complexity_exponent, 1.0);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"constructors_as_targets": true}}"#).unwrap();
        let config = load_config(file.path()).unwrap();
        assert!(config.constructors_as_targets);
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(AnalysisConfig::from_json_str("{\"seed\": \"x\"}").is_err());
        assert!(load_config(Path::new("/nonexistent/nullpath.json")).is_err());
    }
}
