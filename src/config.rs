//! Run configuration: where artifacts live, which source wins, and the
//! analysis policy.
//!
//! ## Environment
//!
//! - `GRAPH_KERNEL_RECORDS_DIR`: per-source record sets (default: `records`)
//! - `GRAPH_KERNEL_MATRICES_DIR`: adjacency artifacts (default: `matrices`)
//! - `GRAPH_KERNEL_INDEX`: entity index document (default: `entity_index_v1.json`)
//! - `GRAPH_KERNEL_OUTPUT_DIR`: tables and manifest (default: `output`)
//! - `GRAPH_KERNEL_TRANSITION`: first period of the authoritative source (required)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::{read_artifact, PeriodInput, SourceCatalog};
use crate::error::GraphError;
use crate::policy::{AnalysisPolicyV1, SourcePrecedence};
use crate::types::PeriodKey;

/// Environment key for the records directory.
pub const ENV_RECORDS_DIR: &str = "GRAPH_KERNEL_RECORDS_DIR";
/// Environment key for the adjacency artifact directory.
pub const ENV_MATRICES_DIR: &str = "GRAPH_KERNEL_MATRICES_DIR";
/// Environment key for the index document path.
pub const ENV_INDEX: &str = "GRAPH_KERNEL_INDEX";
/// Environment key for the output directory.
pub const ENV_OUTPUT_DIR: &str = "GRAPH_KERNEL_OUTPUT_DIR";
/// Environment key for the source transition period.
pub const ENV_TRANSITION: &str = "GRAPH_KERNEL_TRANSITION";

/// Paths, source precedence and policy for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root of `<source>/<period>.json` record sets.
    pub records_dir: PathBuf,
    /// Directory of `adj_<period>.smat` files.
    pub matrices_dir: PathBuf,
    /// Entity index document.
    pub index_path: PathBuf,
    /// Tables and manifest land here.
    pub output_dir: PathBuf,
    /// Per-period source choice.
    pub precedence: SourcePrecedence,
    /// Analysis parameters.
    #[serde(default)]
    pub policy: AnalysisPolicyV1,
}

impl RunConfig {
    /// Config with default paths and policy.
    pub fn new(precedence: SourcePrecedence) -> Self {
        Self {
            records_dir: PathBuf::from("records"),
            matrices_dir: PathBuf::from("matrices"),
            index_path: PathBuf::from("entity_index_v1.json"),
            output_dir: PathBuf::from("output"),
            precedence,
            policy: AnalysisPolicyV1::default(),
        }
    }

    /// Read the process environment.
    pub fn from_env() -> Result<Self, GraphError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults except
    /// the transition period, which has none.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let transition = lookup(ENV_TRANSITION)
            .ok_or_else(|| GraphError::InvalidConfig(format!("{ENV_TRANSITION} is not set")))?;
        let transition = PeriodKey::parse(transition.trim())?;

        let mut config = Self::new(SourcePrecedence::with_default_sources(transition));
        if let Some(dir) = lookup(ENV_RECORDS_DIR) {
            config.records_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_MATRICES_DIR) {
            config.matrices_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_INDEX) {
            config.index_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, GraphError> {
        let bytes = read_artifact(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameters no stage can run with.
    pub fn validate(&self) -> Result<(), GraphError> {
        let policy = &self.policy;
        if !(0.0..=1.0).contains(&policy.damping) {
            return Err(GraphError::InvalidConfig(format!(
                "damping {} outside [0, 1]",
                policy.damping
            )));
        }
        if policy.tolerance <= 0.0 || !policy.tolerance.is_finite() {
            return Err(GraphError::InvalidConfig(format!(
                "tolerance {} must be positive",
                policy.tolerance
            )));
        }
        if !(0.0..=1.0).contains(&policy.layout.cooling_factor) {
            return Err(GraphError::InvalidConfig(format!(
                "cooling factor {} outside [0, 1]",
                policy.layout.cooling_factor
            )));
        }
        Ok(())
    }

    /// Scan the records directory and pick one input per period.
    pub fn select_inputs(&self) -> Result<Vec<PeriodInput>, GraphError> {
        let catalog = SourceCatalog::scan_dir(&self.records_dir)?;
        Ok(catalog.select(&self.precedence))
    }

    /// Path of an output artifact.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        let config = RunConfig::from_lookup(lookup(&[
            (ENV_TRANSITION, "2015-06"),
            (ENV_OUTPUT_DIR, "/tmp/out"),
        ]))
        .unwrap();

        assert_eq!(config.precedence.transition.as_str(), "2015-06");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.matrices_dir, PathBuf::from("matrices"));
        assert_eq!(config.policy, AnalysisPolicyV1::default());
    }

    #[test]
    fn test_transition_required_and_parsed() {
        let missing = RunConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(missing, GraphError::InvalidConfig(_)));

        let bad = RunConfig::from_lookup(lookup(&[(ENV_TRANSITION, "June")])).unwrap_err();
        assert!(matches!(bad, GraphError::InvalidPeriod(_)));
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut config = RunConfig::new(SourcePrecedence::with_default_sources(
            PeriodKey::parse("2016-01").unwrap(),
        ));
        config.policy.top_k = 3;
        std::fs::write(&path, serde_json::to_vec(&config).unwrap()).unwrap();

        let loaded = RunConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);

        config.policy.damping = 1.5;
        std::fs::write(&path, serde_json::to_vec(&config).unwrap()).unwrap();
        assert!(matches!(
            RunConfig::from_json_file(&path),
            Err(GraphError::InvalidConfig(_))
        ));
    }
}
