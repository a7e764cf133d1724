//! Job-group outcomes and the per-group state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChangegateError, Result};

/// Terminal status of a job group, as reported to the aggregator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    Failure,
    Skipped,
    Cancelled,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::Failure => "failure",
            JobOutcome::Skipped => "skipped",
            JobOutcome::Cancelled => "cancelled",
        }
    }

    /// Whether this outcome fails the gate.
    pub fn is_blocking(&self) -> bool {
        matches!(self, JobOutcome::Failure | JobOutcome::Cancelled)
    }

    /// Combine the outcomes of the variants of one job group.
    ///
    /// Cancellation dominates failure, failure dominates success. A group
    /// with no variants, or whose variants were all skipped, is skipped.
    pub fn combine<I: IntoIterator<Item = JobOutcome>>(outcomes: I) -> JobOutcome {
        let mut combined = JobOutcome::Skipped;
        for outcome in outcomes {
            combined = match (combined, outcome) {
                (JobOutcome::Cancelled, _) | (_, JobOutcome::Cancelled) => JobOutcome::Cancelled,
                (JobOutcome::Failure, _) | (_, JobOutcome::Failure) => JobOutcome::Failure,
                (JobOutcome::Success, _) | (_, JobOutcome::Success) => JobOutcome::Success,
                (JobOutcome::Skipped, JobOutcome::Skipped) => JobOutcome::Skipped,
            };
        }
        combined
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobOutcome {
    type Err = ChangegateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(JobOutcome::Success),
            "failure" => Ok(JobOutcome::Failure),
            "skipped" => Ok(JobOutcome::Skipped),
            "cancelled" => Ok(JobOutcome::Cancelled),
            other => Err(ChangegateError::UnknownOutcome(other.to_string())),
        }
    }
}

/// Lifecycle state of one job group.
///
/// `Pending -> Skipped`, or `Pending -> Running -> {Success | Failure | Cancelled}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Skipped,
    Success,
    Failure,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// The outcome this state reports, if terminal.
    pub fn outcome(&self) -> Option<JobOutcome> {
        match self {
            JobState::Pending | JobState::Running => None,
            JobState::Skipped => Some(JobOutcome::Skipped),
            JobState::Success => Some(JobOutcome::Success),
            JobState::Failure => Some(JobOutcome::Failure),
            JobState::Cancelled => Some(JobOutcome::Cancelled),
        }
    }

    fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Skipped)
                | (JobState::Pending, JobState::Running)
                | (JobState::Running, JobState::Success)
                | (JobState::Running, JobState::Failure)
                | (JobState::Running, JobState::Cancelled)
        )
    }
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Success => JobState::Success,
            JobOutcome::Failure => JobState::Failure,
            JobOutcome::Skipped => JobState::Skipped,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// A named job group tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTracker {
    name: String,
    state: JobState,
}

impl JobTracker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: JobState::Pending,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ChangegateError::InvalidTransition {
                job: self.name.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn skip(&mut self) -> Result<()> {
        self.advance(JobState::Skipped)
    }

    pub fn start(&mut self) -> Result<()> {
        self.advance(JobState::Running)
    }

    /// Record the terminal outcome of a running group.
    pub fn finish(&mut self, outcome: JobOutcome) -> Result<()> {
        self.advance(outcome.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_outcomes() {
        assert!(JobOutcome::Failure.is_blocking());
        assert!(JobOutcome::Cancelled.is_blocking());
        assert!(!JobOutcome::Success.is_blocking());
        assert!(!JobOutcome::Skipped.is_blocking());
    }

    #[test]
    fn test_parse_outcome() {
        assert_eq!("success".parse::<JobOutcome>().unwrap(), JobOutcome::Success);
        assert_eq!(" Cancelled ".parse::<JobOutcome>().unwrap(), JobOutcome::Cancelled);
        assert!(matches!(
            "neutral".parse::<JobOutcome>(),
            Err(ChangegateError::UnknownOutcome(_))
        ));
    }

    #[test]
    fn test_combine_variants() {
        use JobOutcome::*;
        assert_eq!(JobOutcome::combine(Vec::new()), Skipped);
        assert_eq!(JobOutcome::combine([Success, Success]), Success);
        assert_eq!(JobOutcome::combine([Success, Failure, Success]), Failure);
        assert_eq!(JobOutcome::combine([Failure, Cancelled]), Cancelled);
        assert_eq!(JobOutcome::combine([Cancelled, Success]), Cancelled);
        assert_eq!(JobOutcome::combine([Skipped, Success]), Success);
    }

    #[test]
    fn test_tracker_run_to_success() {
        let mut job = JobTracker::new("tests");
        assert_eq!(job.state(), JobState::Pending);
        job.start().unwrap();
        assert!(!job.state().is_terminal());
        job.finish(JobOutcome::Success).unwrap();
        assert_eq!(job.state().outcome(), Some(JobOutcome::Success));
    }

    #[test]
    fn test_tracker_skip() {
        let mut job = JobTracker::new("docs");
        job.skip().unwrap();
        assert_eq!(job.state().outcome(), Some(JobOutcome::Skipped));
    }

    #[test]
    fn test_tracker_rejects_illegal_transitions() {
        let mut job = JobTracker::new("docs");
        job.skip().unwrap();
        assert!(job.start().is_err());

        let mut job = JobTracker::new("lint");
        assert!(job.finish(JobOutcome::Success).is_err());

        let mut job = JobTracker::new("build");
        job.start().unwrap();
        // A running group cannot be retroactively skipped.
        assert!(job.finish(JobOutcome::Skipped).is_err());
        job.finish(JobOutcome::Failure).unwrap();
        assert!(job.finish(JobOutcome::Success).is_err());
    }

    #[test]
    fn test_pending_and_running_are_not_terminal() {
        assert_eq!(JobState::Pending.outcome(), None);
        assert_eq!(JobState::Running.outcome(), None);
        assert!(JobState::Cancelled.is_terminal());
    }
}
