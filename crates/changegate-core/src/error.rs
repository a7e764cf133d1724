//! Error taxonomy for change classification and gating.

use crate::outcome::JobState;

/// changegate domain errors.
///
/// Every variant here is a configuration error: it aborts the run before
/// classification. Job failures are never errors, they are outcomes.
#[derive(Debug, thiserror::Error)]
pub enum ChangegateError {
    #[error("git error: {0}")]
    GitError(String),

    #[error("invalid revision range {base}..{head}: {detail}")]
    InvalidRevisionRange {
        base: String,
        head: String,
        detail: String,
    },

    #[error("invalid path pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    #[error("unknown job outcome: {0}")]
    UnknownOutcome(String),

    #[error("invalid job state transition for '{job}': {from:?} -> {to:?}")]
    InvalidTransition {
        job: String,
        from: JobState,
        to: JobState,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for changegate domain operations.
pub type Result<T> = std::result::Result<T, ChangegateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_range_error_names_both_ends() {
        let err = ChangegateError::InvalidRevisionRange {
            base: "HEAD^1".to_string(),
            head: "HEAD".to_string(),
            detail: "unknown revision".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("HEAD^1..HEAD"));
        assert!(msg.contains("unknown revision"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = ChangegateError::InvalidTransition {
            job: "docs".to_string(),
            from: JobState::Skipped,
            to: JobState::Running,
        };
        let msg = err.to_string();
        assert!(msg.contains("docs"));
        assert!(msg.contains("Skipped"));
        assert!(msg.contains("Running"));
    }

    #[test]
    fn test_unknown_outcome_display() {
        let err = ChangegateError::UnknownOutcome("neutral".to_string());
        assert_eq!(err.to_string(), "unknown job outcome: neutral");
    }
}
