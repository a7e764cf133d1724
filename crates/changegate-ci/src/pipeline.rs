//! Gated pipeline orchestration.
//!
//! Every job group whose gate is open is spawned into a `JoinSet`.
//! Closed groups never start and are recorded as skipped. The aggregator
//! joins on every spawned task before reducing outcomes, so it always runs
//! last and always sees terminal states.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use changegate_core::{
    aggregate, ClassificationResult, GateDecision, JobOutcome, JobState, JobTracker, Trigger,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::job::{Gate, JobGroupConfig};
use crate::runner::{Invocation, JobExecutor, VariantResult};

/// What the pipeline was asked to do for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub trigger: Trigger,

    /// Revision override, substituted for `{ref}`.
    pub revision: Option<String>,

    pub classification: ClassificationResult,
}

/// Whether a group will run, decided before anything is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedGroup {
    pub name: String,
    pub gate: Gate,
    pub will_run: bool,
    pub variants: usize,
}

/// Terminal record of one job group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReport {
    pub name: String,
    pub gate: Gate,
    pub state: JobState,
    pub variants: Vec<VariantResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl GroupReport {
    /// Outcome reported to the aggregator.
    pub fn outcome(&self) -> Option<JobOutcome> {
        self.state.outcome()
    }
}

/// Result of a complete pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Unique run ID.
    pub run_id: String,

    /// Digest of the pipeline configuration.
    pub config_digest: String,

    pub request: RunRequest,

    /// Per-group results in config order.
    pub groups: Vec<GroupReport>,

    /// Final gate.
    pub decision: GateDecision,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineReport {
    fn count(&self, outcome: JobOutcome) -> usize {
        self.groups
            .iter()
            .filter(|g| g.outcome() == Some(outcome))
            .count()
    }

    pub fn passed_count(&self) -> usize {
        self.count(JobOutcome::Success)
    }

    pub fn failed_count(&self) -> usize {
        self.count(JobOutcome::Failure) + self.count(JobOutcome::Cancelled)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(JobOutcome::Skipped)
    }

    /// Outcome per group name, the aggregator's input.
    pub fn outcomes(&self) -> BTreeMap<String, JobOutcome> {
        collect_outcomes(&self.groups)
    }
}

fn collect_outcomes(groups: &[GroupReport]) -> BTreeMap<String, JobOutcome> {
    groups
        .iter()
        .filter_map(|g| g.outcome().map(|o| (g.name.clone(), o)))
        .collect()
}

/// Output of one spawned group task.
struct GroupRun {
    variants: Vec<VariantResult>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_ms: u64,
}

/// Gated pipeline orchestrator.
pub struct Pipeline;

impl Pipeline {
    /// Decide which groups run for `classification` without running anything.
    pub fn plan(
        config: &PipelineConfig,
        classification: &ClassificationResult,
    ) -> Vec<PlannedGroup> {
        config
            .jobs
            .iter()
            .map(|job| PlannedGroup {
                name: job.name.clone(),
                gate: job.gate,
                will_run: job.gate.is_open(classification),
                variants: job.effective_variants().len(),
            })
            .collect()
    }

    /// Run every gated-in group concurrently, wait for all of them, and
    /// aggregate.
    ///
    /// A group failing or being cancelled never stops its siblings. A group
    /// task that panics or is aborted is recorded as cancelled.
    pub async fn run(
        executor: Arc<dyn JobExecutor>,
        config: &PipelineConfig,
        request: RunRequest,
    ) -> Result<PipelineReport> {
        let start = Instant::now();
        config.validate()?;
        let config_digest = config.digest()?;
        let run_id = Uuid::new_v4().to_string();

        info!(
            run_id = %run_id,
            config = %&config_digest[..12],
            trigger = ?request.trigger,
            build_docs = request.classification.build_docs,
            build_nbs = request.classification.build_nbs,
            test_code = request.classification.test_code,
            "Starting pipeline"
        );

        let limiter = (config.max_parallel > 0)
            .then(|| Arc::new(Semaphore::new(config.max_parallel)));

        let mut trackers: BTreeMap<String, JobTracker> = BTreeMap::new();
        let mut join_set: JoinSet<(String, GroupRun)> = JoinSet::new();

        for job in &config.jobs {
            let mut tracker = JobTracker::new(job.name.clone());

            if !job.gate.is_open(&request.classification) {
                info!(group = %job.name, gate = ?job.gate, "Skipping gated-out group");
                tracker.skip()?;
                trackers.insert(job.name.clone(), tracker);
                continue;
            }

            info!(group = %job.name, variants = job.effective_variants().len(), "Starting group");
            tracker.start()?;
            trackers.insert(job.name.clone(), tracker);

            let executor = Arc::clone(&executor);
            let job = job.clone();
            let revision = request.revision.clone();
            let limiter = limiter.clone();
            join_set.spawn(async move {
                let run = run_group(executor, &job, revision, limiter).await;
                (job.name, run)
            });
        }

        // Barrier: every spawned group reaches a terminal state before aggregation.
        let mut runs: BTreeMap<String, GroupRun> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            let (name, run) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    warn!(error = %e, "Group task did not complete");
                    continue;
                }
            };
            let tracker = trackers
                .get_mut(&name)
                .ok_or_else(|| PipelineError::InvalidConfig(format!("untracked group '{name}'")))?;

            // A running group cannot become skipped; variants that skip count as done.
            let outcome = match JobOutcome::combine(run.variants.iter().map(|v| v.outcome)) {
                JobOutcome::Skipped => JobOutcome::Success,
                other => other,
            };
            if outcome.is_blocking() {
                warn!(
                    group = %name,
                    %outcome,
                    duration_ms = run.duration_ms,
                    "Group did not pass"
                );
            } else {
                info!(
                    group = %name,
                    %outcome,
                    duration_ms = run.duration_ms,
                    "Group finished"
                );
            }
            tracker.finish(outcome)?;
            runs.insert(name, run);
        }

        // Tasks that panicked or were aborted never reported back.
        for tracker in trackers.values_mut() {
            if tracker.state() == JobState::Running {
                warn!(group = %tracker.name(), "Recording crashed group as cancelled");
                tracker.finish(JobOutcome::Cancelled)?;
            }
        }

        let groups: Vec<GroupReport> = config
            .jobs
            .iter()
            .map(|job| {
                let state = trackers
                    .get(&job.name)
                    .map(JobTracker::state)
                    .unwrap_or(JobState::Pending);
                let run = runs.remove(&job.name);
                GroupReport {
                    name: job.name.clone(),
                    gate: job.gate,
                    state,
                    started_at: run.as_ref().map(|r| r.started_at),
                    finished_at: run.as_ref().map(|r| r.finished_at),
                    duration_ms: run.as_ref().map(|r| r.duration_ms).unwrap_or(0),
                    variants: run.map(|r| r.variants).unwrap_or_default(),
                }
            })
            .collect();

        if let Some(pending) = groups.iter().find(|g| !g.state.is_terminal()) {
            return Err(PipelineError::InvalidConfig(format!(
                "group '{}' never reached a terminal state",
                pending.name
            )));
        }

        let decision = aggregate(&collect_outcomes(&groups));
        let duration_ms = start.elapsed().as_millis() as u64;

        if decision.passed {
            info!(run_id = %run_id, duration_ms, "{}", decision.message);
        } else {
            warn!(run_id = %run_id, duration_ms, "{}", decision.message);
        }

        Ok(PipelineReport {
            run_id,
            config_digest,
            request,
            groups,
            decision,
            duration_ms,
        })
    }
}

/// Run every variant of one group concurrently and collect their results.
async fn run_group(
    executor: Arc<dyn JobExecutor>,
    job: &JobGroupConfig,
    revision: Option<String>,
    limiter: Option<Arc<Semaphore>>,
) -> GroupRun {
    let started_at = Utc::now();
    let start = Instant::now();

    let invocations: Vec<Invocation> = job
        .effective_variants()
        .into_iter()
        .map(|variant| Invocation {
            group: job.name.clone(),
            command: job.render(&variant, revision.as_deref()),
            variant,
            timeout_secs: job.timeout_secs,
        })
        .collect();

    let variants = join_all(invocations.iter().map(|invocation| {
        let executor = Arc::clone(&executor);
        let limiter = limiter.clone();
        async move {
            // acquire() only errors on a closed semaphore, and this one is never closed.
            let _permit = match &limiter {
                Some(sem) => sem.acquire().await.ok(),
                None => None,
            };
            executor.run_variant(invocation).await
        }
    }))
    .await;

    GroupRun {
        variants,
        started_at,
        finished_at: Utc::now(),
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobVariant;

    fn variant(label: &str, outcome: JobOutcome) -> VariantResult {
        VariantResult {
            label: label.to_string(),
            outcome,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
            error: None,
        }
    }

    fn group(name: &str, state: JobState) -> GroupReport {
        GroupReport {
            name: name.to_string(),
            gate: Gate::Always,
            state,
            variants: vec![variant("default", JobOutcome::Success)],
            started_at: None,
            finished_at: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_plan_docs_only() {
        let config = PipelineConfig::default();
        let classification = ClassificationResult {
            build_docs: true,
            build_nbs: false,
            test_code: false,
        };
        let plan = Pipeline::plan(&config, &classification);
        let running: Vec<&str> = plan
            .iter()
            .filter(|p| p.will_run)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(running, vec!["docs"]);
    }

    #[test]
    fn test_plan_counts_variants() {
        let mut config = PipelineConfig::default();
        config.jobs[0] = config.jobs[0].clone().with_variants(vec![
            JobVariant::new(None, Some("py311")),
            JobVariant::new(None, Some("py312")),
        ]);
        let plan = Pipeline::plan(&config, &ClassificationResult::FULL);
        assert_eq!(plan[0].variants, 2);
        assert!(plan.iter().all(|p| p.will_run));
    }

    #[test]
    fn test_report_counts() {
        let report = PipelineReport {
            run_id: "run123".to_string(),
            config_digest: "abc123".to_string(),
            request: RunRequest {
                trigger: Trigger::PullRequest,
                revision: None,
                classification: ClassificationResult::FULL,
            },
            groups: vec![
                group("lint", JobState::Success),
                group("tests", JobState::Failure),
                group("docs", JobState::Skipped),
                group("build", JobState::Cancelled),
            ],
            decision: aggregate(&BTreeMap::new()),
            duration_ms: 300,
        };

        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.outcomes().len(), 4);
        assert_eq!(report.outcomes()["build"], JobOutcome::Cancelled);
    }
}
