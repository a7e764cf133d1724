//! Job-group definitions: what runs, under which gate, across which variants.

use changegate_core::ClassificationResult;
use serde::{Deserialize, Serialize};

/// Which classification flag opens a job group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// Runs on every trigger.
    Always,
    BuildDocs,
    BuildNbs,
    TestCode,
}

impl Gate {
    /// Whether this gate is open for `classification`.
    pub fn is_open(&self, classification: &ClassificationResult) -> bool {
        match self {
            Gate::Always => true,
            Gate::BuildDocs => classification.build_docs,
            Gate::BuildNbs => classification.build_nbs,
            Gate::TestCode => classification.test_code,
        }
    }
}

/// Builtin job groups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinGroup {
    /// Static checks over the codebase.
    Lint,

    /// Test suite, split by marker across environments.
    Tests,

    /// Example notebooks executed end to end.
    Notebooks,

    /// Documentation build.
    Docs,

    /// Package build.
    Build,
}

impl BuiltinGroup {
    pub const ALL: [BuiltinGroup; 5] = [
        BuiltinGroup::Lint,
        BuiltinGroup::Notebooks,
        BuiltinGroup::Tests,
        BuiltinGroup::Build,
        BuiltinGroup::Docs,
    ];

    /// Get the group name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinGroup::Lint => "lint",
            BuiltinGroup::Tests => "tests",
            BuiltinGroup::Notebooks => "notebooks",
            BuiltinGroup::Docs => "docs",
            BuiltinGroup::Build => "build",
        }
    }

    pub fn gate(&self) -> Gate {
        match self {
            BuiltinGroup::Lint | BuiltinGroup::Tests | BuiltinGroup::Build => Gate::TestCode,
            BuiltinGroup::Notebooks => Gate::BuildNbs,
            BuiltinGroup::Docs => Gate::BuildDocs,
        }
    }

    /// Command template. `{selection}`, `{env}` and `{ref}` are filled per variant.
    pub fn command(&self) -> Vec<String> {
        let args: &[&str] = match self {
            BuiltinGroup::Lint => &["python", "-m", "flake8"],
            BuiltinGroup::Tests => &["tox", "-e", "{env}", "--", "-m", "{selection}"],
            BuiltinGroup::Notebooks => &[
                "tox",
                "-e",
                "{env}",
                "--",
                "notebooks",
                "-m",
                "{selection}",
            ],
            BuiltinGroup::Docs => &["python", "-m", "sphinx", "-W", "doc", "build/docs/{ref}"],
            BuiltinGroup::Build => &["python", "-m", "build", "--outdir", "dist/{ref}"],
        };
        args.iter().map(|a| a.to_string()).collect()
    }

    /// Default variant matrix.
    pub fn variants(&self) -> Vec<JobVariant> {
        match self {
            BuiltinGroup::Tests => ["serial", "other", "dml", "main", "treatment", "ray"]
                .into_iter()
                .map(|s| JobVariant::new(Some(s), Some("py312")))
                .collect(),
            BuiltinGroup::Notebooks => ["regular", "customer"]
                .into_iter()
                .map(|s| JobVariant::new(Some(s), Some("py312")))
                .collect(),
            BuiltinGroup::Lint | BuiltinGroup::Docs | BuiltinGroup::Build => Vec::new(),
        }
    }

    /// Default timeout in seconds.
    pub fn timeout_secs(&self) -> u64 {
        match self {
            BuiltinGroup::Lint => 600,
            BuiltinGroup::Docs | BuiltinGroup::Build => 1800,
            BuiltinGroup::Tests | BuiltinGroup::Notebooks => 3600,
        }
    }
}

/// One cell of a job group's matrix.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobVariant {
    /// Test or notebook selection pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,

    /// Environment variant (interpreter, platform, extras).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl JobVariant {
    pub fn new(selection: Option<&str>, env: Option<&str>) -> Self {
        Self {
            selection: selection.map(str::to_string),
            env: env.map(str::to_string),
        }
    }

    /// Short label for logs, e.g. `dml@py312`.
    pub fn label(&self) -> String {
        match (&self.selection, &self.env) {
            (Some(s), Some(e)) => format!("{s}@{e}"),
            (Some(s), None) => s.clone(),
            (None, Some(e)) => format!("@{e}"),
            (None, None) => "default".to_string(),
        }
    }
}

/// Configuration for a job group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobGroupConfig {
    /// Group name, unique within a pipeline.
    pub name: String,

    /// Classification flag that opens this group.
    pub gate: Gate,

    /// Command template (first element is executable).
    pub command: Vec<String>,

    /// Matrix cells. An empty list runs the command once.
    #[serde(default)]
    pub variants: Vec<JobVariant>,

    /// Per-variant timeout in seconds, `0` for none.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl JobGroupConfig {
    /// Create a group configuration from a builtin group.
    pub fn from_builtin(group: BuiltinGroup) -> Self {
        Self {
            name: group.name().to_string(),
            gate: group.gate(),
            command: group.command(),
            variants: group.variants(),
            timeout_secs: group.timeout_secs(),
        }
    }

    /// Create a custom group configuration with no variants.
    pub fn custom(name: String, gate: Gate, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            gate,
            command,
            variants: Vec::new(),
            timeout_secs,
        }
    }

    pub fn with_variants(mut self, variants: Vec<JobVariant>) -> Self {
        self.variants = variants;
        self
    }

    /// The variants to run; a group without a matrix runs once.
    pub fn effective_variants(&self) -> Vec<JobVariant> {
        if self.variants.is_empty() {
            vec![JobVariant::default()]
        } else {
            self.variants.clone()
        }
    }

    /// Fill the command template for one variant.
    ///
    /// An argument that consisted only of placeholders and renders empty is
    /// dropped. `{ref}` falls back to `HEAD`.
    pub fn render(&self, variant: &JobVariant, revision: Option<&str>) -> Vec<String> {
        let selection = variant.selection.as_deref().unwrap_or("");
        let env = variant.env.as_deref().unwrap_or("");
        let revision = revision.unwrap_or("HEAD");

        self.command
            .iter()
            .filter_map(|arg| {
                let rendered = arg
                    .replace("{selection}", selection)
                    .replace("{env}", env)
                    .replace("{ref}", revision);
                if rendered.is_empty() && !arg.is_empty() {
                    None
                } else {
                    Some(rendered)
                }
            })
            .collect()
    }
}

/// The standard lint/tests/notebooks/docs/build groups.
pub fn default_groups() -> Vec<JobGroupConfig> {
    BuiltinGroup::ALL
        .iter()
        .map(|g| JobGroupConfig::from_builtin(*g))
        .collect()
}
