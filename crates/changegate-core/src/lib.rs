//! changegate core library
//!
//! Decides which CI job groups a pull request can affect and folds their
//! outcomes into a single gate:
//! - [`classify`] turns a [`ChangeSet`] into three gate flags
//! - [`aggregate`] reduces job outcomes into a [`GateDecision`]

pub mod aggregate;
pub mod changeset;
pub mod classify;
pub mod error;
pub mod outcome;
pub mod rules;
pub mod telemetry;

pub use aggregate::{
    aggregate, parse_outcome_pair, parse_outcomes_json, BlockingJob, GateDecision,
};
pub use changeset::{capture_head_sha, diff_changed_files, ChangeSet, RevisionRange};
pub use classify::{classify, classify_with, ClassificationResult, Trigger};
pub use error::{ChangegateError, Result};
pub use outcome::{JobOutcome, JobState, JobTracker};
pub use rules::{Category, PathRule, PathRuleSpec, RuleSet};
pub use telemetry::init_tracing;
