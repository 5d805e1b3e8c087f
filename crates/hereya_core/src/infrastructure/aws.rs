//! `aws` backend.
//!
//! IaC runs locally like the `local` backend, with `AWS_REGION` injected.
//! Secrets and stored env values live in Secrets Manager / SSM Parameter
//! Store and are read and written through the `aws` CLI.

use std::sync::Arc;

use async_trait::async_trait;
use hereya_iac::EnvMap;
use hereya_runner::{CommandConfig, CommandRunner};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

use super::{InfrastructureAdapter, PackageExecutor, ProvisionRequest, ResolvedEnvValue};

/// SSM path prefix for values written by hereya.
pub const SSM_PREFIX: &str = "/hereya";

const SECRETS_MANAGER_ARN: &str = "arn:aws:secretsmanager:";
const SSM_ARN: &str = "arn:aws:ssm:";
const SSM_NAME: &str = "ssm:";

pub struct AwsInfrastructure {
    executor: Arc<PackageExecutor>,
    runner: Arc<dyn CommandRunner>,
    region: Option<String>,
    aws: String,
    npx: String,
}

impl AwsInfrastructure {
    pub fn new(executor: Arc<PackageExecutor>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            executor,
            runner,
            region: None,
            aws: "aws".to_string(),
            npx: "npx".to_string(),
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_binaries(mut self, aws: impl Into<String>, npx: impl Into<String>) -> Self {
        self.aws = aws.into();
        self.npx = npx.into();
        self
    }

    fn region_env(&self) -> EnvMap {
        let mut env = EnvMap::new();
        if let Some(region) = &self.region {
            env.insert("AWS_REGION".to_string(), region.clone());
        }
        env
    }

    fn parameter_name(name: &str) -> String {
        format!("{}/{}", SSM_PREFIX, name.trim_start_matches('/'))
    }

    /// Run a CLI invocation and return trimmed stdout.
    async fn exec(&self, program: &str, tool: &str, args: &[&str]) -> CoreResult<String> {
        let config = CommandConfig::new(program)
            .args(args.iter().copied())
            .envs(&self.region_env());
        debug!("{}", config.command_line());

        let result = self
            .runner
            .run(&config)
            .await
            .map_err(|e| CoreError::from_runner(tool, e))?;
        if !result.success() {
            return Err(CoreError::ExternalToolFailure {
                tool: tool.to_string(),
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result.stdout.trim().to_string())
    }

    async fn aws(&self, args: &[&str]) -> CoreResult<String> {
        let aws = self.aws.clone();
        self.exec(&aws, "aws", args).await
    }

    async fn get_parameter(&self, name: &str) -> CoreResult<String> {
        self.aws(&[
            "ssm",
            "get-parameter",
            "--name",
            name,
            "--with-decryption",
            "--query",
            "Parameter.Value",
            "--output",
            "text",
        ])
        .await
    }

    async fn put_parameter(&self, name: &str, value: &str, kind: &str) -> CoreResult<()> {
        self.aws(&[
            "ssm",
            "put-parameter",
            "--name",
            name,
            "--value",
            value,
            "--type",
            kind,
            "--overwrite",
        ])
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InfrastructureAdapter for AwsInfrastructure {
    fn name(&self) -> &str {
        "aws"
    }

    async fn provision(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
        self.executor.apply(request, &self.region_env()).await
    }

    async fn destroy(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
        self.executor.destroy(request, &self.region_env()).await
    }

    async fn deploy(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
        self.executor.apply(request, &self.region_env()).await
    }

    async fn undeploy(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
        self.executor.destroy(request, &self.region_env()).await
    }

    async fn bootstrap(&self) -> CoreResult<()> {
        info!("Bootstrapping AWS environment with cdk");
        let npx = self.npx.clone();
        self.exec(&npx, "cdk", &["cdk", "bootstrap"]).await?;
        Ok(())
    }

    async fn resolve_env(&self, value: &str) -> CoreResult<ResolvedEnvValue> {
        if value.starts_with(SECRETS_MANAGER_ARN) {
            let secret = self
                .aws(&[
                    "secretsmanager",
                    "get-secret-value",
                    "--secret-id",
                    value,
                    "--query",
                    "SecretString",
                    "--output",
                    "text",
                ])
                .await
                .map_err(|e| CoreError::EnvResolutionFailure {
                    value: value.to_string(),
                    reason: e.to_string(),
                })?;
            return Ok(ResolvedEnvValue::secret(secret));
        }

        let parameter = if value.starts_with(SSM_ARN) {
            Some(value)
        } else {
            value.strip_prefix(SSM_NAME)
        };
        if let Some(name) = parameter {
            let resolved = self
                .get_parameter(name)
                .await
                .map_err(|e| CoreError::EnvResolutionFailure {
                    value: value.to_string(),
                    reason: e.to_string(),
                })?;
            return Ok(ResolvedEnvValue::secret(resolved));
        }

        Ok(ResolvedEnvValue::plain(value))
    }

    async fn save_env(&self, id: &str, env: &EnvMap) -> CoreResult<()> {
        let name = Self::parameter_name(&format!("env/{}", id));
        info!("Saving env for {} to SSM parameter {}", id, name);
        let content = serde_json::to_string(env)?;
        self.put_parameter(&name, &content, "SecureString").await
    }

    async fn store_env(&self, name: &str, value: &str) -> CoreResult<String> {
        let parameter = Self::parameter_name(name);
        self.put_parameter(&parameter, value, "SecureString").await?;
        Ok(format!("{}{}", SSM_NAME, parameter))
    }

    async fn unstore_env(&self, name: &str) -> CoreResult<()> {
        let parameter = Self::parameter_name(name);
        self.aws(&["ssm", "delete-parameter", "--name", parameter.as_str()])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::GitFetcher;
    use hereya_iac::IacRegistry;
    use hereya_runner::{MockResponse, MockRunner};
    use tempfile::tempdir;

    fn aws(runner: MockRunner, root: &std::path::Path) -> AwsInfrastructure {
        let runner: Arc<dyn CommandRunner> = Arc::new(runner);
        let executor = PackageExecutor::new(
            Arc::new(IacRegistry::with_defaults(runner.clone())),
            Arc::new(GitFetcher::new(runner.clone())),
            root,
        );
        AwsInfrastructure::new(Arc::new(executor), runner).with_region(Some("eu-west-1".to_string()))
    }

    #[tokio::test]
    async fn test_plain_value_passes_through() {
        let dir = tempdir().unwrap();
        let runner = MockRunner::new();
        let infra = aws(runner.clone(), dir.path());

        let resolved = infra.resolve_env("my-bucket").await.unwrap();

        assert!(!resolved.is_secret);
        assert_eq!(resolved.value, "my-bucket");
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_secrets_manager_arn_is_fetched() {
        let dir = tempdir().unwrap();
        let runner = MockRunner::new()
            .respond_to("get-secret-value", MockResponse::success("s3cr3t\n"));
        let infra = aws(runner.clone(), dir.path());

        let arn = "arn:aws:secretsmanager:eu-west-1:123:secret:db-pass";
        let resolved = infra.resolve_env(arn).await.unwrap();

        assert_eq!(resolved, ResolvedEnvValue::secret("s3cr3t"));
        let call = &runner.calls_matching("get-secret-value")[0];
        assert!(call.args.contains(&arn.to_string()));
        assert_eq!(call.env.get("AWS_REGION").unwrap(), "eu-west-1");
    }

    #[tokio::test]
    async fn test_ssm_name_is_fetched() {
        let dir = tempdir().unwrap();
        let runner =
            MockRunner::new().respond_to("get-parameter", MockResponse::success("value-1"));
        let infra = aws(runner.clone(), dir.path());

        let resolved = infra.resolve_env("ssm:/hereya/api-key").await.unwrap();

        assert!(resolved.is_secret);
        assert_eq!(resolved.value, "value-1");
        let call = &runner.calls_matching("get-parameter")[0];
        assert!(call.args.contains(&"/hereya/api-key".to_string()));
    }

    #[tokio::test]
    async fn test_failed_lookup_is_resolution_failure() {
        let dir = tempdir().unwrap();
        let runner = MockRunner::new()
            .respond_to("get-parameter", MockResponse::failure(255, "ParameterNotFound"));
        let infra = aws(runner, dir.path());

        let err = infra.resolve_env("ssm:/hereya/missing").await.unwrap_err();
        assert!(matches!(err, CoreError::EnvResolutionFailure { .. }));
    }

    #[tokio::test]
    async fn test_store_env_returns_reference() {
        let dir = tempdir().unwrap();
        let runner = MockRunner::new();
        let infra = aws(runner.clone(), dir.path());

        let reference = infra.store_env("DB_PASSWORD", "pw").await.unwrap();

        assert_eq!(reference, "ssm:/hereya/DB_PASSWORD");
        assert_eq!(runner.calls_matching("put-parameter").len(), 1);
    }

    #[tokio::test]
    async fn test_unbootstrap_not_implemented() {
        let dir = tempdir().unwrap();
        let infra = aws(MockRunner::new(), dir.path());
        let err = infra.unbootstrap().await.unwrap_err();
        assert!(matches!(err, CoreError::NotImplemented { operation, .. } if operation == "unbootstrap"));
    }
}
