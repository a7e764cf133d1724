//! changegate - change-gated CI driver
//!
//! ## Commands
//!
//! - `classify`: decide which job groups a change set can affect
//! - `aggregate`: fold job outcomes into the final gate
//! - `run`: classify, run the gated-in groups concurrently, and aggregate

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, Level};

use changegate_ci::{Pipeline, PipelineConfig, PipelineReport, ProcessExecutor, RunRequest};
use changegate_core::{
    aggregate, classify_with, diff_changed_files, parse_outcome_pair, parse_outcomes_json,
    ChangeSet, ClassificationResult, GateDecision, JobOutcome, RevisionRange, Trigger,
};

/// Default config file looked up in the repository root.
const DEFAULT_CONFIG_FILE: &str = "changegate.json";

/// Exit code for configuration errors (bad revision range, unreadable config).
const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "changegate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Run only the CI job groups a change can affect, then gate on them",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Repository root
    #[arg(long, global = true, env = "CHANGEGATE_REPO", default_value = ".")]
    repo: PathBuf,

    /// Pipeline config file (default: changegate.json in the repository root, if present)
    #[arg(long, global = true, env = "CHANGEGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a change set into buildDocs / buildNbs / testCode
    Classify {
        #[command(flatten)]
        changes: ChangeArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: ClassifyFormat,

        /// Also append `key=value` lines to this file
        #[arg(long)]
        output_file: Option<PathBuf>,
    },

    /// Reduce job outcomes into the final pass/fail gate
    Aggregate {
        /// Outcomes as JSON: {"job": "success"} or {"job": {"result": "success"}}
        #[arg(long, conflicts_with = "needs_file")]
        needs: Option<String>,

        /// File containing outcomes as JSON
        #[arg(long)]
        needs_file: Option<PathBuf>,

        /// Outcomes as NAME=OUTCOME pairs
        outcomes: Vec<String>,

        /// Emit the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify, run the gated-in job groups, and aggregate
    Run {
        #[command(flatten)]
        changes: ChangeArgs,

        /// Revision override passed to job commands as {ref}
        #[arg(long = "ref")]
        revision: Option<String>,

        /// Print which groups would run and exit
        #[arg(long)]
        dry_run: bool,

        /// Write the full run report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ChangeArgs {
    /// Treat this run as a pull request (otherwise every gate opens)
    #[arg(long)]
    pull_request: bool,

    /// Base revision of the diff
    #[arg(long, default_value = "HEAD^1")]
    base: String,

    /// Head revision of the diff
    #[arg(long, default_value = "HEAD")]
    head: String,

    /// Use these changed paths instead of running git diff
    #[arg(long, num_args = 0..)]
    files: Option<Vec<String>>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassifyFormat {
    Json,
    Outputs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    changegate_core::init_tracing(cli.json_logs, level);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Classify {
            changes,
            format,
            output_file,
        } => {
            let config = load_config(&cli.repo, cli.config.as_deref())?;
            cmd_classify(&cli.repo, &config, &changes, format, output_file.as_deref())
        }
        Commands::Aggregate {
            needs,
            needs_file,
            outcomes,
            json,
        } => cmd_aggregate(needs.as_deref(), needs_file.as_deref(), &outcomes, json),
        Commands::Run {
            changes,
            revision,
            dry_run,
            report,
        } => {
            let config = load_config(&cli.repo, cli.config.as_deref())?;
            cmd_run(&cli.repo, &config, &changes, revision, dry_run, report.as_deref()).await
        }
    }
}

/// Explicit config, else `changegate.json` in the repo root, else the built-in defaults.
fn load_config(repo: &Path, explicit: Option<&Path>) -> Result<PipelineConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = repo.join(DEFAULT_CONFIG_FILE);
            if !candidate.is_file() {
                info!("No {} found, using built-in pipeline", DEFAULT_CONFIG_FILE);
                return Ok(PipelineConfig::default());
            }
            candidate
        }
    };
    PipelineConfig::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
}

/// Resolve the change set and classify it.
fn resolve_classification(
    repo: &Path,
    config: &PipelineConfig,
    changes: &ChangeArgs,
) -> Result<(Trigger, ClassificationResult)> {
    let trigger = Trigger::from_pull_request(changes.pull_request);
    let rules = config.rule_set()?;

    let change_set = match (&changes.files, trigger) {
        (Some(files), _) => ChangeSet::new(files.clone()),
        // Manual runs open every gate, so there is nothing to diff.
        (None, Trigger::Manual) => ChangeSet::default(),
        (None, Trigger::PullRequest) => {
            let range = RevisionRange::new(changes.base.clone(), changes.head.clone());
            diff_changed_files(repo, &range).context("Failed to compute changed files")?
        }
    };

    let classification = classify_with(&rules, &change_set, trigger);
    info!(
        trigger = ?trigger,
        files = change_set.len(),
        build_docs = classification.build_docs,
        build_nbs = classification.build_nbs,
        test_code = classification.test_code,
        "Classified change set"
    );
    Ok((trigger, classification))
}

fn cmd_classify(
    repo: &Path,
    config: &PipelineConfig,
    changes: &ChangeArgs,
    format: ClassifyFormat,
    output_file: Option<&Path>,
) -> Result<ExitCode> {
    let (_, classification) = resolve_classification(repo, config, changes)?;

    match format {
        ClassifyFormat::Json => println!("{}", serde_json::to_string_pretty(&classification)?),
        ClassifyFormat::Outputs => print!("{}", classification.to_output_lines()),
    }

    if let Some(path) = output_file {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file {}", path.display()))?;
        file.write_all(classification.to_output_lines().as_bytes())?;
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_aggregate(
    needs: Option<&str>,
    needs_file: Option<&Path>,
    pairs: &[String],
    json: bool,
) -> Result<ExitCode> {
    let mut outcomes: BTreeMap<String, JobOutcome> = BTreeMap::new();

    let raw = match (needs, needs_file) {
        (Some(raw), _) => Some(raw.to_string()),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        (None, None) => None,
    };
    if let Some(raw) = raw {
        outcomes.extend(parse_outcomes_json(&raw).context("Failed to parse job outcomes")?);
    }
    for pair in pairs {
        let (name, outcome) = parse_outcome_pair(pair)?;
        if outcomes.insert(name.clone(), outcome).is_some() {
            bail!("Outcome for '{}' given more than once", name);
        }
    }

    let decision = aggregate(&outcomes);
    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        for (name, outcome) in &outcomes {
            println!("  {} {} ({})", status_mark(*outcome), name, outcome);
        }
        print_decision(&decision);
    }

    Ok(exit_code(&decision))
}

async fn cmd_run(
    repo: &Path,
    config: &PipelineConfig,
    changes: &ChangeArgs,
    revision: Option<String>,
    dry_run: bool,
    report_path: Option<&Path>,
) -> Result<ExitCode> {
    let (trigger, classification) = resolve_classification(repo, config, changes)?;

    println!("Trigger: {:?}", trigger);
    println!("{}", classification.to_output_lines().trim_end().replace('\n', ", "));
    println!();

    if dry_run {
        for planned in Pipeline::plan(config, &classification) {
            let mark = if planned.will_run { "run " } else { "skip" };
            println!(
                "  {} {} (gate: {:?}, {} variant(s))",
                mark, planned.name, planned.gate, planned.variants
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let executor = Arc::new(ProcessExecutor::new(repo));
    let request = RunRequest {
        trigger,
        revision,
        classification,
    };
    let report = Pipeline::run(executor, config, request)
        .await
        .context("Pipeline failed to run")?;

    print_report(&report);

    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(exit_code(&report.decision))
}

fn print_report(report: &PipelineReport) {
    println!("Run ID: {}", report.run_id);
    println!("Duration: {}ms", report.duration_ms);
    println!();

    for group in &report.groups {
        let outcome = group.outcome().unwrap_or(JobOutcome::Cancelled);
        println!(
            "  {} {} ({}, {}ms)",
            status_mark(outcome),
            group.name,
            outcome,
            group.duration_ms
        );
        for variant in group.variants.iter().filter(|v| !v.passed()) {
            let reason = variant.error.as_deref().unwrap_or("failed");
            println!("      ✗ {}: {}", variant.label, reason);
            if let Some(tail) = last_lines(&variant.stderr, 10) {
                for line in tail.lines() {
                    println!("        {}", line);
                }
            }
        }
    }

    println!();
    println!(
        "Summary: {} passed, {} failed, {} skipped",
        report.passed_count(),
        report.failed_count(),
        report.skipped_count()
    );
    print_decision(&report.decision);
}

fn print_decision(decision: &GateDecision) {
    println!(
        "Status: {}",
        if decision.passed { "✓ PASSED" } else { "✗ FAILED" }
    );
    println!("{}", decision.message);
}

fn status_mark(outcome: JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Success => "✓",
        JobOutcome::Skipped => "-",
        JobOutcome::Failure | JobOutcome::Cancelled => "✗",
    }
}

fn exit_code(decision: &GateDecision) -> ExitCode {
    ExitCode::from(decision.exit_code() as u8)
}

/// Last `n` non-empty lines of `text`, if any.
fn last_lines(text: &str, n: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(n);
    Some(lines[start..].join("\n"))
}
