//! Result aggregation: reduce every job group's terminal outcome to one gate.
//!
//! Skipped groups are neutral. Any failed or cancelled group fails the gate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChangegateError, Result};
use crate::outcome::JobOutcome;

/// A job group that blocked the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingJob {
    pub job: String,
    pub outcome: JobOutcome,
}

/// Final pass/fail decision over all job groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Whether the gate passed.
    pub passed: bool,

    /// Groups that failed or were cancelled, in name order (empty if passed).
    pub blocking: Vec<BlockingJob>,

    /// Summary message.
    pub message: String,
}

impl GateDecision {
    /// Process exit code for this decision: 0 on pass, 1 on fail.
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

/// Reduce a mapping of job-group outcomes into a [`GateDecision`].
///
/// An empty mapping passes.
pub fn aggregate(outcomes: &BTreeMap<String, JobOutcome>) -> GateDecision {
    let blocking: Vec<BlockingJob> = outcomes
        .iter()
        .filter(|(_, outcome)| outcome.is_blocking())
        .map(|(job, outcome)| BlockingJob {
            job: job.clone(),
            outcome: *outcome,
        })
        .collect();

    let passed = blocking.is_empty();
    let message = if passed {
        let ran = outcomes
            .values()
            .filter(|o| **o == JobOutcome::Success)
            .count();
        format!(
            "Gate passed ({} succeeded, {} skipped)",
            ran,
            outcomes.len() - ran
        )
    } else {
        let names: Vec<String> = blocking
            .iter()
            .map(|b| format!("{} ({})", b.job, b.outcome))
            .collect();
        format!("Gate failed: {}", names.join(", "))
    };

    GateDecision {
        passed,
        blocking,
        message,
    }
}

/// Parse job outcomes from JSON.
///
/// Accepts either a flat `{"lint": "success"}` object or the orchestrator's
/// `needs` context shape `{"lint": {"result": "success", "outputs": {}}}`.
pub fn parse_outcomes_json(raw: &str) -> Result<BTreeMap<String, JobOutcome>> {
    let value: Value = serde_json::from_str(raw)?;
    let object = value
        .as_object()
        .ok_or_else(|| ChangegateError::UnknownOutcome("expected a JSON object".to_string()))?;

    let mut outcomes = BTreeMap::new();
    for (job, entry) in object {
        let result = match entry {
            Value::String(s) => s.as_str(),
            Value::Object(fields) => fields
                .get("result")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ChangegateError::UnknownOutcome(format!("job '{job}' has no result field"))
                })?,
            other => {
                return Err(ChangegateError::UnknownOutcome(format!(
                    "job '{job}' has unexpected value {other}"
                )))
            }
        };
        outcomes.insert(job.clone(), result.parse()?);
    }
    Ok(outcomes)
}

/// Parse a `name=outcome` pair.
pub fn parse_outcome_pair(pair: &str) -> Result<(String, JobOutcome)> {
    let (name, outcome) = pair.split_once('=').ok_or_else(|| {
        ChangegateError::UnknownOutcome(format!("expected NAME=OUTCOME, got '{pair}'"))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ChangegateError::UnknownOutcome(format!(
            "missing job name in '{pair}'"
        )));
    }
    Ok((name.to_string(), outcome.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes(pairs: &[(&str, JobOutcome)]) -> BTreeMap<String, JobOutcome> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_empty_passes() {
        let decision = aggregate(&BTreeMap::new());
        assert!(decision.passed);
        assert!(decision.blocking.is_empty());
        assert_eq!(decision.exit_code(), 0);
    }

    #[test]
    fn test_skipped_and_success_pass() {
        let decision = aggregate(&outcomes(&[
            ("docs", JobOutcome::Skipped),
            ("tests", JobOutcome::Success),
        ]));
        assert!(decision.passed);
        assert!(decision.message.contains("1 succeeded"));
        assert!(decision.message.contains("1 skipped"));
    }

    #[test]
    fn test_failure_fails() {
        let decision = aggregate(&outcomes(&[
            ("lint", JobOutcome::Failure),
            ("tests", JobOutcome::Success),
        ]));
        assert!(!decision.passed);
        assert_eq!(decision.exit_code(), 1);
        assert_eq!(
            decision.blocking,
            vec![BlockingJob {
                job: "lint".to_string(),
                outcome: JobOutcome::Failure,
            }]
        );
    }

    #[test]
    fn test_cancelled_fails() {
        let decision = aggregate(&outcomes(&[("notebooks", JobOutcome::Cancelled)]));
        assert!(!decision.passed);
        assert!(decision.message.contains("notebooks (cancelled)"));
    }

    #[test]
    fn test_all_skipped_passes() {
        let decision = aggregate(&outcomes(&[
            ("lint", JobOutcome::Skipped),
            ("tests", JobOutcome::Skipped),
            ("docs", JobOutcome::Skipped),
        ]));
        assert!(decision.passed);
    }

    #[test]
    fn test_parse_needs_context() {
        let raw = r#"{
            "lint": {"result": "success", "outputs": {}},
            "docs": {"result": "skipped", "outputs": {}},
            "tests": {"result": "cancelled", "outputs": {}}
        }"#;
        let parsed = parse_outcomes_json(raw).unwrap();
        assert_eq!(parsed["lint"], JobOutcome::Success);
        assert_eq!(parsed["docs"], JobOutcome::Skipped);
        assert_eq!(parsed["tests"], JobOutcome::Cancelled);
        assert!(!aggregate(&parsed).passed);
    }

    #[test]
    fn test_parse_flat_map() {
        let parsed = parse_outcomes_json(r#"{"build": "failure"}"#).unwrap();
        assert_eq!(parsed["build"], JobOutcome::Failure);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_outcomes_json("[]").is_err());
        assert!(parse_outcomes_json(r#"{"lint": 3}"#).is_err());
        assert!(parse_outcomes_json(r#"{"lint": {"outputs": {}}}"#).is_err());
        assert!(parse_outcomes_json(r#"{"lint": "neutral"}"#).is_err());
        assert!(parse_outcomes_json("not json").is_err());
    }

    #[test]
    fn test_parse_outcome_pair() {
        let (name, outcome) = parse_outcome_pair("docs=skipped").unwrap();
        assert_eq!(name, "docs");
        assert_eq!(outcome, JobOutcome::Skipped);
        assert!(parse_outcome_pair("docs").is_err());
        assert!(parse_outcome_pair("=success").is_err());
    }
}
