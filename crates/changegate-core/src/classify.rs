//! Change classification: which job groups a change set can affect.
//!
//! Documentation and notebooks are rebuilt whenever code changes, because a
//! code change can break them without touching their sources. Pure doc or
//! notebook edits never trigger the code test suite.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::changeset::ChangeSet;
use crate::rules::{Category, RuleSet};

/// How the pipeline run was triggered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A pull request; only the affected job groups run.
    PullRequest,
    /// Manual or direct invocation; everything runs.
    Manual,
}

impl Trigger {
    pub fn from_pull_request(is_pull_request: bool) -> Self {
        if is_pull_request {
            Trigger::PullRequest
        } else {
            Trigger::Manual
        }
    }

    pub fn is_pull_request(&self) -> bool {
        matches!(self, Trigger::PullRequest)
    }
}

/// The three gate flags derived from a change set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub build_docs: bool,
    pub build_nbs: bool,
    pub test_code: bool,
}

impl ClassificationResult {
    /// Every gate open.
    pub const FULL: Self = Self {
        build_docs: true,
        build_nbs: true,
        test_code: true,
    };

    /// Every gate closed.
    pub const NONE: Self = Self {
        build_docs: false,
        build_nbs: false,
        test_code: false,
    };

    /// `key=value` lines in the shape CI orchestrators read step outputs from.
    pub fn to_output_lines(&self) -> String {
        format!(
            "buildDocs={}\nbuildNbs={}\ntestCode={}\n",
            self.build_docs, self.build_nbs, self.test_code
        )
    }
}

/// Which categories appeared in a change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CategoryPresence {
    doc: bool,
    notebook: bool,
    code: bool,
}

impl CategoryPresence {
    fn record(&mut self, category: Category) {
        match category {
            Category::Ignored => {}
            Category::Doc => self.doc = true,
            Category::Notebook => self.notebook = true,
            Category::Code => self.code = true,
        }
    }

    fn into_result(self) -> ClassificationResult {
        ClassificationResult {
            build_docs: self.doc || self.code,
            build_nbs: self.notebook || self.code,
            test_code: self.code,
        }
    }
}

/// Classify `change_set` with the standard rule set.
pub fn classify(change_set: &ChangeSet, is_pull_request: bool) -> ClassificationResult {
    classify_with(&RuleSet::default(), change_set, Trigger::from_pull_request(is_pull_request))
}

/// Classify `change_set` against `rules`.
///
/// Manual triggers open every gate without looking at the change set.
pub fn classify_with(
    rules: &RuleSet,
    change_set: &ChangeSet,
    trigger: Trigger,
) -> ClassificationResult {
    if !trigger.is_pull_request() {
        return ClassificationResult::FULL;
    }

    let mut presence = CategoryPresence::default();
    for path in change_set.iter() {
        let category = rules.categorize(path);
        debug!(path, ?category, "Classified path");
        presence.record(category);
        if presence.code {
            // Code opens every gate; the remaining paths cannot change the result.
            break;
        }
    }

    presence.into_result()
}
