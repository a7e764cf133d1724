//! Errors raised while configuring or driving job groups.

use changegate_core::ChangegateError;

/// Pipeline errors.
///
/// A job group that runs and fails is not an error; it is recorded as an
/// outcome. These variants cover configuration problems and command
/// execution problems that the runner turns into outcomes.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("job group '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{invocation}' timed out after {secs} seconds")]
    Timeout { invocation: String, secs: u64 },

    #[error(transparent)]
    Core(#[from] ChangegateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
