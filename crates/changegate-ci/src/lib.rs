//! changegate CI - gated job-group execution
//!
//! Provides a pipeline driver that:
//! - Opens or closes each job group from a change classification
//! - Runs the open groups (and their variant matrices) concurrently
//! - Waits for every group and reduces the outcomes into one gate

pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod runner;

// Re-export key types
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use job::{default_groups, BuiltinGroup, Gate, JobGroupConfig, JobVariant};
pub use pipeline::{GroupReport, Pipeline, PipelineReport, PlannedGroup, RunRequest};
pub use runner::{CommandRunner, Invocation, JobExecutor, ProcessExecutor, VariantResult};
