//! Workspace env files inside a project checkout.
//!
//! `.hereya/env.<workspace>.yaml` holds the tagged values exported by
//! provisioned packages. `hereyaenv/env.yaml` and
//! `hereyaenv/env.<workspace>.yaml` hold raw user overrides that win over
//! anything exported.

use std::path::{Path, PathBuf};

use hereya_iac::EnvMap;
use tracing::{debug, info};

use crate::env::EnvNamespace;
use crate::error::CoreResult;

pub const STATE_DIR: &str = ".hereya";
pub const USER_ENV_DIR: &str = "hereyaenv";

#[derive(Debug, Clone)]
pub struct ProjectEnv {
    project_root: PathBuf,
}

impl ProjectEnv {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub fn env_file(&self, workspace: &str) -> PathBuf {
        self.project_root
            .join(STATE_DIR)
            .join(format!("env.{}.yaml", workspace))
    }

    /// Tagged values currently registered for the workspace.
    pub async fn get_tagged(&self, workspace: &str) -> CoreResult<EnvMap> {
        read_env(&self.env_file(workspace)).await
    }

    /// Merge tagged values into the workspace env file.
    pub async fn add_project_env(&self, workspace: &str, env: &EnvMap) -> CoreResult<()> {
        if env.is_empty() {
            return Ok(());
        }
        let path = self.env_file(workspace);
        let mut current = read_env(&path).await?;
        current.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        write_env(&path, &current).await?;
        info!("Registered {} env values for {}", env.len(), workspace);
        Ok(())
    }

    /// Drop the keys of `env` from the workspace env file.
    pub async fn remove_project_env(&self, workspace: &str, env: &EnvMap) -> CoreResult<()> {
        let path = self.env_file(workspace);
        if env.is_empty() || !path.exists() {
            return Ok(());
        }
        let mut current = read_env(&path).await?;
        for key in env.keys() {
            current.remove(key);
        }
        write_env(&path, &current).await?;
        info!("Removed {} env values from {}", env.len(), workspace);
        Ok(())
    }

    /// Raw user overrides, workspace file over the shared one.
    pub async fn user_overrides(&self, workspace: &str) -> CoreResult<EnvMap> {
        let dir = self.project_root.join(USER_ENV_DIR);
        let mut env = read_env(&dir.join("env.yaml")).await?;
        env.extend(read_env(&dir.join(format!("env.{}.yaml", workspace))).await?);
        Ok(env)
    }

    /// Resolved project env: exported values resolved through their
    /// backends, then user overrides on top.
    pub async fn get_project_env(
        &self,
        workspace: &str,
        namespace: &EnvNamespace,
        mark_secret: bool,
    ) -> CoreResult<EnvMap> {
        let tagged = self.get_tagged(workspace).await?;
        let mut env = namespace.resolve_all(&tagged, mark_secret).await?;
        env.extend(self.user_overrides(workspace).await?);
        Ok(env)
    }
}

async fn read_env(path: &Path) -> CoreResult<EnvMap> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(EnvMap::new()),
        Ok(content) => Ok(serde_yaml::from_str::<Option<EnvMap>>(&content)?.unwrap_or_default()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No env file at {:?}", path);
            Ok(EnvMap::new())
        }
        Err(e) => Err(e.into()),
    }
}

async fn write_env(path: &Path, env: &EnvMap) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_yaml::to_string(env)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{InfrastructureAdapter, InfrastructureRegistry, ResolvedEnvValue};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Verbatim;

    #[async_trait]
    impl InfrastructureAdapter for Verbatim {
        fn name(&self) -> &str {
            "local"
        }

        async fn resolve_env(&self, value: &str) -> CoreResult<ResolvedEnvValue> {
            Ok(ResolvedEnvValue::plain(value))
        }
    }

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let dir = tempdir().unwrap();
        let project = ProjectEnv::new(dir.path());

        project
            .add_project_env("dev", &env(&[("A", "local:1"), ("B", "local:2")]))
            .await
            .unwrap();
        project
            .remove_project_env("dev", &env(&[("A", "ignored")]))
            .await
            .unwrap();

        let tagged = project.get_tagged("dev").await.unwrap();
        assert_eq!(tagged, env(&[("B", "local:2")]));
        assert!(dir.path().join(".hereya/env.dev.yaml").exists());
    }

    #[tokio::test]
    async fn test_user_overrides_win() {
        let dir = tempdir().unwrap();
        let project = ProjectEnv::new(dir.path());
        project
            .add_project_env("dev", &env(&[("URL", "local:http://a"), ("PORT", "local:80")]))
            .await
            .unwrap();
        let overrides = dir.path().join(USER_ENV_DIR);
        std::fs::create_dir_all(&overrides).unwrap();
        std::fs::write(overrides.join("env.yaml"), "URL: http://shared\nDEBUG: '1'\n").unwrap();
        std::fs::write(overrides.join("env.dev.yaml"), "URL: http://dev\n").unwrap();

        let mut registry = InfrastructureRegistry::new();
        registry.register(Arc::new(Verbatim));
        let namespace = EnvNamespace::new(Arc::new(registry));

        let resolved = project
            .get_project_env("dev", &namespace, false)
            .await
            .unwrap();

        assert_eq!(
            resolved,
            env(&[("DEBUG", "1"), ("PORT", "80"), ("URL", "http://dev")])
        );
    }
}
