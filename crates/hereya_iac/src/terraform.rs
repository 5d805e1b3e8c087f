//! Terraform adapter.

use std::sync::Arc;

use async_trait::async_trait;
use hereya_runner::{CommandConfig, CommandRunner};
use tracing::{debug, info};

use crate::adapter::{require_program, run_tool, EnvMap, IacAdapter, IacRequest};
use crate::error::IacResult;
use crate::outputs::{parse_terraform_outputs, render_value};

/// Runs the `terraform` binary against a package checkout.
pub struct TerraformAdapter {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl TerraformAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "terraform".to_string(),
        }
    }

    /// Use a custom terraform binary (e.g. `tofu` or an absolute path).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self, request: &IacRequest, args: &[&str]) -> CommandConfig {
        CommandConfig::new(&self.binary)
            .args(args.iter().copied())
            .workdir(&request.pkg_path)
            .envs(&request.env)
            .env("TF_IN_AUTOMATION", "1")
            .stream_logs(true)
    }

    /// `-var key=value` pairs, ordered by key.
    fn var_args(request: &IacRequest) -> Vec<String> {
        request
            .parameters
            .iter()
            .flat_map(|(key, value)| ["-var".to_string(), format!("{}={}", key, render_value(value))])
            .collect()
    }

    async fn init(&self, request: &IacRequest) -> IacResult<()> {
        info!("Running terraform init in {:?}", request.pkg_path);
        run_tool(
            self.runner.as_ref(),
            "terraform",
            &self.command(request, &["init", "-input=false", "-no-color"]),
        )
        .await?;
        Ok(())
    }

    async fn outputs(&self, request: &IacRequest) -> IacResult<EnvMap> {
        let result = run_tool(
            self.runner.as_ref(),
            "terraform",
            &self
                .command(request, &["output", "-json", "-no-color"])
                .stream_logs(false),
        )
        .await?;
        parse_terraform_outputs(&result.stdout)
    }
}

#[async_trait]
impl IacAdapter for TerraformAdapter {
    fn name(&self) -> &str {
        "terraform"
    }

    async fn apply(&self, request: &IacRequest) -> IacResult<EnvMap> {
        require_program(self.runner.as_ref(), "terraform", &self.binary).await?;
        self.init(request).await?;

        let vars = Self::var_args(request);
        debug!("terraform apply vars for {}: {:?}", request.id, vars);
        info!("Running terraform apply for {}", request.id);
        let config = self
            .command(request, &["apply", "-auto-approve", "-input=false", "-no-color"])
            .args(vars);
        run_tool(self.runner.as_ref(), "terraform", &config).await?;

        self.outputs(request).await
    }

    async fn destroy(&self, request: &IacRequest) -> IacResult<EnvMap> {
        require_program(self.runner.as_ref(), "terraform", &self.binary).await?;
        self.init(request).await?;
        let env = self.outputs(request).await?;

        info!("Running terraform destroy for {}", request.id);
        let config = self
            .command(request, &["destroy", "-auto-approve", "-input=false", "-no-color"])
            .args(Self::var_args(request));
        run_tool(self.runner.as_ref(), "terraform", &config).await?;

        Ok(env)
    }
}
