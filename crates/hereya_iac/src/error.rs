//! Error types for IaC module.

use hereya_runner::RunnerError;
use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur during IaC operations.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Unsupported IaC type: {0}")]
    UnsupportedIacType(String),

    #[error("{tool} failed with exit code {exit_code}: {stderr}")]
    ExternalToolFailure {
        tool: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to parse {tool} outputs: {message}")]
    OutputParse { tool: String, message: String },

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IacError {
    /// Convert a runner error raised while executing `tool`.
    ///
    /// A non-zero exit or a missing program becomes `ExternalToolFailure`;
    /// spawn and I/O problems stay runner errors.
    pub fn from_runner(tool: &str, err: RunnerError) -> Self {
        match err {
            RunnerError::ProgramNotAvailable(program) => Self::ExternalToolFailure {
                tool: tool.to_string(),
                exit_code: 127,
                stderr: format!("{} is not installed or not on PATH", program),
            },
            RunnerError::NonZeroExit {
                exit_code, stderr, ..
            } => Self::ExternalToolFailure {
                tool: tool.to_string(),
                exit_code,
                stderr,
            },
            other => Self::Runner(other),
        }
    }
}
