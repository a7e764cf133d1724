//! Changed-file discovery from a git revision pair.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChangegateError, Result};

/// Ordered, immutable list of repository-relative paths changed between two
/// revisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    paths: Vec<String>,
}

impl ChangeSet {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    /// Parse `git diff --name-only` output. Blank lines are dropped.
    pub fn from_name_only(output: &str) -> Self {
        let paths = output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self { paths }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

impl FromIterator<String> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// The two revisions a change set is computed between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRange {
    pub base: String,
    pub head: String,
}

impl RevisionRange {
    pub fn new(base: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            head: head.into(),
        }
    }

    /// Range for a pull-request merge commit: first parent to the merge itself.
    pub fn merge_commit() -> Self {
        Self::new("HEAD^1", "HEAD")
    }
}

/// Compute the change set between `range.base` and `range.head` in `repo_dir`.
///
/// Any git failure is a configuration error; nothing is retried. A range
/// with no differences yields an empty change set.
pub fn diff_changed_files(repo_dir: &Path, range: &RevisionRange) -> Result<ChangeSet> {
    let output = Command::new("git")
        .args(["diff", "--name-only", &range.base, &range.head])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| ChangegateError::GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ChangegateError::InvalidRevisionRange {
            base: range.base.clone(),
            head: range.head.clone(),
            detail: stderr.trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let change_set = ChangeSet::from_name_only(&stdout);
    debug!(
        base = %range.base,
        head = %range.head,
        files = change_set.len(),
        "Computed change set"
    );
    Ok(change_set)
}

/// Capture the HEAD commit SHA from a git repository.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| ChangegateError::GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ChangegateError::GitError(format!(
            "git rev-parse HEAD failed: {stderr}"
        )));
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        return Err(ChangegateError::GitError(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }

    Ok(sha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_only_drops_blank_lines() {
        let cs = ChangeSet::from_name_only("doc/intro.md\n\neconml/dml.py\n");
        assert_eq!(cs.paths(), &["doc/intro.md", "econml/dml.py"]);
    }

    #[test]
    fn test_from_name_only_preserves_order() {
        let cs = ChangeSet::from_name_only("b.py\na.py\nc.py");
        let paths: Vec<&str> = cs.iter().collect();
        assert_eq!(paths, vec!["b.py", "a.py", "c.py"]);
    }

    #[test]
    fn test_empty_output_is_empty_change_set() {
        let cs = ChangeSet::from_name_only("");
        assert!(cs.is_empty());
        assert_eq!(cs.len(), 0);
    }

    #[test]
    fn test_change_set_serializes_as_array() {
        let cs: ChangeSet = vec!["README.md".to_string()].into_iter().collect();
        let json = serde_json::to_string(&cs).unwrap();
        assert_eq!(json, r#"["README.md"]"#);
    }

    #[test]
    fn test_merge_commit_range() {
        let range = RevisionRange::merge_commit();
        assert_eq!(range.base, "HEAD^1");
        assert_eq!(range.head, "HEAD");
    }

    #[test]
    fn test_diff_outside_repo_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = diff_changed_files(dir.path(), &RevisionRange::merge_commit()).unwrap_err();
        assert!(matches!(
            err,
            ChangegateError::InvalidRevisionRange { .. } | ChangegateError::GitError(_)
        ));
    }

    #[test]
    fn test_capture_head_sha_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(capture_head_sha(dir.path()).is_err());
    }
}
