//! AWS CDK adapter.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hereya_runner::{CommandConfig, CommandRunner};
use tracing::{debug, info, warn};

use crate::adapter::{require_program, run_tool, EnvMap, IacAdapter, IacRequest};
use crate::error::IacResult;
use crate::outputs::{parse_cdk_outputs, render_value};

/// Outputs file written by `cdk deploy`, relative to the package checkout.
pub const CDK_OUTPUTS_FILE: &str = "cdk.outputs.json";

/// Runs the CDK through `npx` against a package checkout.
pub struct CdkAdapter {
    runner: Arc<dyn CommandRunner>,
    npx: String,
    npm: String,
}

impl CdkAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            npx: "npx".to_string(),
            npm: "npm".to_string(),
        }
    }

    /// Use custom `npx`/`npm` binaries.
    pub fn with_binaries(mut self, npx: impl Into<String>, npm: impl Into<String>) -> Self {
        self.npx = npx.into();
        self.npm = npm.into();
        self
    }

    fn outputs_path(request: &IacRequest) -> PathBuf {
        request.pkg_path.join(CDK_OUTPUTS_FILE)
    }

    /// Outputs of the last deploy; a missing file reads as no outputs.
    async fn read_outputs(request: &IacRequest) -> IacResult<EnvMap> {
        match tokio::fs::read_to_string(Self::outputs_path(request)).await {
            Ok(content) => parse_cdk_outputs(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EnvMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn base_command(&self, program: &str, request: &IacRequest) -> CommandConfig {
        CommandConfig::new(program)
            .workdir(&request.pkg_path)
            .envs(&request.env)
            .env("STACK_NAME", &request.id)
            .stream_logs(true)
    }

    /// `--context key=value` pairs, ordered by key.
    fn context_args(request: &IacRequest) -> Vec<String> {
        request
            .parameters
            .iter()
            .flat_map(|(key, value)| {
                ["--context".to_string(), format!("{}={}", key, render_value(value))]
            })
            .collect()
    }

    async fn install(&self, request: &IacRequest) -> IacResult<()> {
        if !request.pkg_path.join("package.json").exists() {
            debug!("No package.json in {:?}, skipping npm install", request.pkg_path);
            return Ok(());
        }
        info!("Installing CDK dependencies in {:?}", request.pkg_path);
        let config = self
            .base_command(&self.npm, request)
            .args(["install", "--no-audit", "--no-fund"]);
        run_tool(self.runner.as_ref(), "npm", &config).await?;
        Ok(())
    }
}

#[async_trait]
impl IacAdapter for CdkAdapter {
    fn name(&self) -> &str {
        "cdk"
    }

    async fn apply(&self, request: &IacRequest) -> IacResult<EnvMap> {
        require_program(self.runner.as_ref(), "cdk", &self.npx).await?;
        self.install(request).await?;

        let outputs_path = Self::outputs_path(request);
        info!("Running cdk deploy for {}", request.id);
        let config = self
            .base_command(&self.npx, request)
            .args(["cdk", "deploy", "--all", "--require-approval", "never", "--outputs-file"])
            .arg(outputs_path.to_string_lossy())
            .args(Self::context_args(request));
        run_tool(self.runner.as_ref(), "cdk", &config).await?;

        if !outputs_path.exists() {
            warn!("cdk produced no outputs file for {}", request.id);
        }
        Self::read_outputs(request).await
    }

    async fn destroy(&self, request: &IacRequest) -> IacResult<EnvMap> {
        require_program(self.runner.as_ref(), "cdk", &self.npx).await?;
        self.install(request).await?;
        let env = Self::read_outputs(request).await?;

        info!("Running cdk destroy for {}", request.id);
        let config = self
            .base_command(&self.npx, request)
            .args(["cdk", "destroy", "--all", "--force"])
            .args(Self::context_args(request));
        run_tool(self.runner.as_ref(), "cdk", &config).await?;

        Ok(env)
    }
}
