//! Command runner trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CommandConfig;
use crate::error::RunnerResult;

/// Outcome of one program invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub program: String,
    /// -1 when the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, falling back to stdout.
    pub fn failure_hint(&self) -> Option<&str> {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        source.lines().rev().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Runs external programs on behalf of the engine.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Check if a program can be executed.
    async fn is_available(&self, program: &str) -> bool;

    /// Run a program to completion and capture its output.
    ///
    /// There is no timeout: a hung process blocks the caller.
    async fn run(&self, config: &CommandConfig) -> RunnerResult<ExecutionResult>;
}
