//! Pipeline configuration and its identity digest.

use std::collections::HashSet;
use std::path::Path;

use changegate_core::{PathRuleSpec, RuleSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};
use crate::job::{default_groups, JobGroupConfig};

/// Pipeline configuration.
///
/// Loaded from a JSON file; any section left out falls back to the
/// standard rules and job groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Ordered path rules, first match wins.
    #[serde(default = "RuleSet::default_specs")]
    pub rules: Vec<PathRuleSpec>,

    /// Job groups in declaration order.
    #[serde(default = "default_groups")]
    pub jobs: Vec<JobGroupConfig>,

    /// Upper bound on concurrently running variants, `0` for unlimited.
    #[serde(default)]
    pub max_parallel: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rules: RuleSet::default_specs(),
            jobs: default_groups(),
            max_parallel: 0,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Reject configs that cannot run: duplicate or empty group names, empty
    /// commands, and rule patterns that do not compile.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "job group name must not be empty".to_string(),
                ));
            }
            if !seen.insert(job.name.as_str()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "duplicate job group '{}'",
                    job.name
                )));
            }
            if job.command.is_empty() {
                return Err(PipelineError::EmptyCommand(job.name.clone()));
            }
        }
        self.rule_set()?;
        Ok(())
    }

    /// Compile the rule list.
    pub fn rule_set(&self) -> Result<RuleSet> {
        Ok(RuleSet::from_specs(&self.rules)?)
    }

    /// Look up a job group by name.
    pub fn job(&self, name: &str) -> Option<&JobGroupConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Deterministic SHA-256 digest of the resolved config.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(compute_digest(&bytes))
    }
}

fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Gate;
    use changegate_core::Category;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().expect("default config valid");
        assert_eq!(config.jobs.len(), 5);
        assert!(config.job("docs").is_some());
        assert!(config.job("deploy").is_none());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_config_overrides_jobs_only() {
        let raw = r#"{
            "jobs": [
                {"name": "check", "gate": "always", "command": ["make", "check"]}
            ],
            "max_parallel": 2
        }"#;
        let config = PipelineConfig::from_json(raw).unwrap();
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].gate, Gate::Always);
        assert_eq!(config.max_parallel, 2);
        assert_eq!(config.rules, RuleSet::default_specs());
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let raw = r#"{"jobs": [
            {"name": "lint", "gate": "test_code", "command": ["a"]},
            {"name": "lint", "gate": "test_code", "command": ["b"]}
        ]}"#;
        let err = PipelineConfig::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate job group 'lint'"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let raw = r#"{"jobs": [{"name": "lint", "gate": "test_code", "command": []}]}"#;
        let err = PipelineConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyCommand(name) if name == "lint"));
    }

    #[test]
    fn test_bad_rule_pattern_rejected() {
        let raw = r#"{"rules": [{"pattern": "doc/[", "category": "doc"}]}"#;
        let err = PipelineConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, PipelineError::Core(_)));
    }

    #[test]
    fn test_unknown_gate_rejected() {
        let raw = r#"{"jobs": [{"name": "lint", "gate": "sometimes", "command": ["a"]}]}"#;
        assert!(matches!(
            PipelineConfig::from_json(raw),
            Err(PipelineError::Serialization(_))
        ));
    }

    #[test]
    fn test_digest_deterministic_and_sensitive() {
        let a = PipelineConfig::default();
        let b = PipelineConfig::default();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);

        let mut c = PipelineConfig::default();
        c.rules.insert(0, PathRuleSpec::new("CHANGELOG.md", Category::Ignored));
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_parallel": 3}}"#).unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_parallel, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/changegate.json")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
