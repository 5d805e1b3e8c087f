//! IaC adapter trait and request types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use hereya_runner::{CommandConfig, CommandRunner, ExecutionResult, RunnerError};
use serde::{Deserialize, Serialize};

use crate::error::{IacError, IacResult};

/// Flat environment map (key → raw value).
pub type EnvMap = BTreeMap<String, String>;

/// Package parameters. Values are strings or structured YAML/JSON values.
pub type Parameters = BTreeMap<String, serde_json::Value>;

/// Everything an adapter needs to run a tool against one package checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IacRequest {
    /// Identifier for the deployment (canonical package name); used as the
    /// stack name by tools that need one.
    pub id: String,
    /// Local checkout of the package source
    pub pkg_path: PathBuf,
    /// Environment variables exposed to the tool process
    pub env: EnvMap,
    /// Parameters mapped onto the tool's variable mechanism
    pub parameters: Parameters,
}

impl IacRequest {
    pub fn new(id: impl Into<String>, pkg_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            pkg_path: pkg_path.into(),
            ..Self::default()
        }
    }

    pub fn with_env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Drives one IaC tool.
#[async_trait]
pub trait IacAdapter: Send + Sync {
    /// Registry tag of this tool (e.g. `terraform`).
    fn name(&self) -> &str;

    /// Apply the package and return its outputs.
    async fn apply(&self, request: &IacRequest) -> IacResult<EnvMap>;

    /// Destroy the package and return the outputs it had before destruction.
    async fn destroy(&self, request: &IacRequest) -> IacResult<EnvMap>;
}

/// Refuse to start a tool run when `program` cannot be executed.
pub(crate) async fn require_program(
    runner: &dyn CommandRunner,
    tool: &str,
    program: &str,
) -> IacResult<()> {
    if runner.is_available(program).await {
        return Ok(());
    }
    Err(IacError::from_runner(
        tool,
        RunnerError::ProgramNotAvailable(program.to_string()),
    ))
}

/// Run a tool invocation, surfacing any non-zero exit as `ExternalToolFailure`.
pub(crate) async fn run_tool(
    runner: &dyn CommandRunner,
    tool: &str,
    config: &CommandConfig,
) -> IacResult<ExecutionResult> {
    let result = runner
        .run(config)
        .await
        .map_err(|e| IacError::from_runner(tool, e))?;

    if !result.success() {
        if let Some(hint) = result.failure_hint() {
            tracing::warn!("{} exited with {}: {}", tool, result.exit_code, hint);
        }
        return Err(IacError::ExternalToolFailure {
            tool: tool.to_string(),
            exit_code: result.exit_code,
            stderr: result.stderr.trim().to_string(),
        });
    }
    Ok(result)
}
