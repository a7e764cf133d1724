//! Ordered path rules that assign a change category to every changed file.

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::error::{ChangegateError, Result};

/// What kind of change a single path represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Never triggers any job group.
    Ignored,
    /// Documentation sources.
    Doc,
    /// Example notebooks.
    Notebook,
    /// Library code, build metadata, and anything no rule recognises.
    Code,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A single `(pattern, category)` pair.
///
/// `*` stays within one path component, `**` spans directories.
#[derive(Debug, Clone)]
pub struct PathRule {
    source: String,
    pattern: Pattern,
    category: Category,
}

impl PathRule {
    /// Compile a rule. A trailing `/**` is widened to `/**/*` so that
    /// `doc/**` covers every file below `doc/`.
    pub fn new(pattern: &str, category: Category) -> Result<Self> {
        let widened = match pattern.strip_suffix("/**") {
            Some(dir) => format!("{dir}/**/*"),
            None => pattern.to_string(),
        };
        let compiled = Pattern::new(&widened).map_err(|e| ChangegateError::InvalidPattern {
            pattern: pattern.to_string(),
            detail: e.msg.to_string(),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            pattern: compiled,
            category,
        })
    }

    /// The pattern as written, before widening.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn spec(&self) -> PathRuleSpec {
        PathRuleSpec::new(self.source.clone(), self.category)
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches_with(path, MATCH_OPTIONS)
    }
}

/// Serializable form of a rule, as it appears in pipeline config files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathRuleSpec {
    pub pattern: String,
    pub category: Category,
}

impl PathRuleSpec {
    pub fn new(pattern: impl Into<String>, category: Category) -> Self {
        Self {
            pattern: pattern.into(),
            category,
        }
    }
}

/// Ordered rule list, evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<PathRule>,
}

impl RuleSet {
    /// Compile an ordered list of rule specs.
    pub fn from_specs(specs: &[PathRuleSpec]) -> Result<Self> {
        let rules = specs
            .iter()
            .map(|s| PathRule::new(&s.pattern, s.category))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// The rule specs the standard rule set is built from.
    pub fn default_specs() -> Vec<PathRuleSpec> {
        vec![
            PathRuleSpec::new("README.md", Category::Ignored),
            PathRuleSpec::new(".gitignore", Category::Ignored),
            PathRuleSpec::new("econml/_version.py", Category::Ignored),
            PathRuleSpec::new("prototypes/**", Category::Ignored),
            PathRuleSpec::new("images/**", Category::Ignored),
            PathRuleSpec::new("doc/**", Category::Doc),
            PathRuleSpec::new("notebooks/**", Category::Notebook),
        ]
    }

    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    /// Category of `path`. Paths no rule matches are [`Category::Code`].
    pub fn categorize(&self, path: &str) -> Category {
        self.rules
            .iter()
            .find(|r| r.matches(path))
            .map(PathRule::category)
            .unwrap_or(Category::Code)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        let rules = Self::default_specs()
            .iter()
            .filter_map(|s| PathRule::new(&s.pattern, s.category).ok())
            .collect();
        Self { rules }
    }
}
