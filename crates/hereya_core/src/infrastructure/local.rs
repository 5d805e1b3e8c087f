//! `local` backend: runs IaC on this machine and keeps state in the hereya home.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hereya_iac::EnvMap;
use tracing::info;

use crate::error::CoreResult;

use super::{InfrastructureAdapter, PackageExecutor, ProvisionRequest, ResolvedEnvValue};

pub struct LocalInfrastructure {
    executor: Arc<PackageExecutor>,
}

impl LocalInfrastructure {
    pub fn new(executor: Arc<PackageExecutor>) -> Self {
        Self { executor }
    }

    fn state_dir(&self) -> PathBuf {
        self.executor.root().join("state").join("local")
    }

    fn env_dir(&self) -> PathBuf {
        self.state_dir().join("env")
    }
}

#[async_trait]
impl InfrastructureAdapter for LocalInfrastructure {
    fn name(&self) -> &str {
        "local"
    }

    async fn provision(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
        self.executor.apply(request, &EnvMap::new()).await
    }

    async fn destroy(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
        self.executor.destroy(request, &EnvMap::new()).await
    }

    async fn deploy(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
        self.executor.apply(request, &EnvMap::new()).await
    }

    async fn undeploy(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
        self.executor.destroy(request, &EnvMap::new()).await
    }

    async fn bootstrap(&self) -> CoreResult<()> {
        info!("Bootstrapping local infrastructure under {:?}", self.state_dir());
        tokio::fs::create_dir_all(self.env_dir()).await?;
        tokio::fs::create_dir_all(self.executor.root().join("packages")).await?;
        Ok(())
    }

    async fn unbootstrap(&self) -> CoreResult<()> {
        let dir = self.env_dir();
        if dir.exists() {
            info!("Removing saved local env in {:?}", dir);
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    async fn resolve_env(&self, value: &str) -> CoreResult<ResolvedEnvValue> {
        Ok(ResolvedEnvValue::plain(value))
    }

    async fn save_env(&self, id: &str, env: &EnvMap) -> CoreResult<()> {
        let dir = self.env_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let content = serde_yaml::to_string(env)?;
        tokio::fs::write(dir.join(format!("{}.yaml", id)), content).await?;
        Ok(())
    }
}
