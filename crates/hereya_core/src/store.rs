//! Persistent project and workspace metadata.
//!
//! The engine talks to storage through [`StateStore`]. [`FileStore`] keeps
//! one YAML record per project, workspace and applied-state snapshot under
//! `<home>/backend/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hereya_iac::{EnvMap, Parameters};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ProjectConfig;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub default_workspace: String,
    pub created_at: DateTime<Utc>,
}

/// A package installed at workspace level, with the parameters it used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspacePackage {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: Parameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    /// Tagged env values visible to every project using the workspace.
    #[serde(default)]
    pub env: EnvMap,
    #[serde(default)]
    pub packages: BTreeMap<String, WorkspacePackage>,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            env: EnvMap::new(),
            packages: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// Storage contract for projects, workspaces and applied-state snapshots.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create the project record, or return the existing one.
    async fn create_project(&self, name: &str, workspace: &str) -> CoreResult<Project>;
    async fn get_project(&self, name: &str) -> CoreResult<Option<Project>>;

    /// Create the workspace, or return the existing one.
    async fn create_workspace(&self, name: &str) -> CoreResult<Workspace>;
    async fn get_workspace(&self, name: &str) -> CoreResult<Option<Workspace>>;
    async fn delete_workspace(&self, name: &str) -> CoreResult<()>;

    async fn get_workspace_env(&self, name: &str) -> CoreResult<EnvMap>;
    async fn set_env_var(&self, workspace: &str, key: &str, value: &str) -> CoreResult<()>;
    async fn unset_env_var(&self, workspace: &str, key: &str) -> CoreResult<()>;

    async fn add_package_to_workspace(
        &self,
        workspace: &str,
        reference: &str,
        package: WorkspacePackage,
        env: &EnvMap,
    ) -> CoreResult<()>;
    async fn remove_package_from_workspace(
        &self,
        workspace: &str,
        reference: &str,
        env: &EnvMap,
    ) -> CoreResult<()>;

    /// Last successfully applied project config for (project, workspace).
    async fn get_state(&self, project: &str, workspace: &str) -> CoreResult<Option<ProjectConfig>>;
    async fn save_state(&self, config: &ProjectConfig) -> CoreResult<()>;
}

/// YAML files under a backend directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

/// File-safe form of a record name.
fn file_name(name: &str) -> String {
    format!("{}.yaml", name.replace(['/', '\\'], "-"))
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `<home>/backend`.
    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join("backend"))
    }

    fn project_path(&self, name: &str) -> PathBuf {
        self.root.join("projects").join(file_name(name))
    }

    fn workspace_path(&self, name: &str) -> PathBuf {
        self.root.join("workspaces").join(file_name(name))
    }

    fn state_path(&self, project: &str, workspace: &str) -> PathBuf {
        self.root
            .join("state")
            .join(project.replace(['/', '\\'], "-"))
            .join(file_name(workspace))
    }

    async fn read<T: DeserializeOwned>(path: &Path) -> CoreResult<Option<T>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_yaml::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize>(path: &Path, value: &T) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_yaml::to_string(value)?).await?;
        debug!("Wrote {:?}", path);
        Ok(())
    }

    async fn require_workspace(&self, name: &str) -> CoreResult<Workspace> {
        self.get_workspace(name)
            .await?
            .ok_or_else(|| CoreError::WorkspaceNotFound(name.to_string()))
    }

    async fn update_workspace<F>(&self, name: &str, update: F) -> CoreResult<()>
    where
        F: FnOnce(&mut Workspace) + Send,
    {
        let mut workspace = self.require_workspace(name).await?;
        update(&mut workspace);
        Self::write(&self.workspace_path(name), &workspace).await
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn create_project(&self, name: &str, workspace: &str) -> CoreResult<Project> {
        if let Some(existing) = self.get_project(name).await? {
            return Ok(existing);
        }
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            default_workspace: workspace.to_string(),
            created_at: Utc::now(),
        };
        Self::write(&self.project_path(name), &project).await?;
        info!("Created project {}", name);
        Ok(project)
    }

    async fn get_project(&self, name: &str) -> CoreResult<Option<Project>> {
        Self::read(&self.project_path(name)).await
    }

    async fn create_workspace(&self, name: &str) -> CoreResult<Workspace> {
        if let Some(existing) = self.get_workspace(name).await? {
            return Ok(existing);
        }
        let workspace = Workspace::new(name);
        Self::write(&self.workspace_path(name), &workspace).await?;
        info!("Created workspace {}", name);
        Ok(workspace)
    }

    async fn get_workspace(&self, name: &str) -> CoreResult<Option<Workspace>> {
        Self::read(&self.workspace_path(name)).await
    }

    async fn delete_workspace(&self, name: &str) -> CoreResult<()> {
        let workspace = self.require_workspace(name).await?;
        if !workspace.packages.is_empty() {
            return Err(CoreError::Store(format!(
                "workspace {} still has {} installed packages",
                name,
                workspace.packages.len()
            )));
        }
        tokio::fs::remove_file(self.workspace_path(name)).await?;
        info!("Deleted workspace {}", name);
        Ok(())
    }

    async fn get_workspace_env(&self, name: &str) -> CoreResult<EnvMap> {
        Ok(self.require_workspace(name).await?.env)
    }

    async fn set_env_var(&self, workspace: &str, key: &str, value: &str) -> CoreResult<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.update_workspace(workspace, move |ws| {
            ws.env.insert(key, value);
        })
        .await
    }

    async fn unset_env_var(&self, workspace: &str, key: &str) -> CoreResult<()> {
        let key = key.to_string();
        self.update_workspace(workspace, move |ws| {
            ws.env.remove(&key);
        })
        .await
    }

    async fn add_package_to_workspace(
        &self,
        workspace: &str,
        reference: &str,
        package: WorkspacePackage,
        env: &EnvMap,
    ) -> CoreResult<()> {
        let reference = reference.to_string();
        let env = env.clone();
        self.update_workspace(workspace, move |ws| {
            ws.packages.insert(reference, package);
            ws.env.extend(env);
        })
        .await
    }

    async fn remove_package_from_workspace(
        &self,
        workspace: &str,
        reference: &str,
        env: &EnvMap,
    ) -> CoreResult<()> {
        let reference = reference.to_string();
        let keys: Vec<String> = env.keys().cloned().collect();
        self.update_workspace(workspace, move |ws| {
            ws.packages.remove(&reference);
            for key in keys {
                ws.env.remove(&key);
            }
        })
        .await
    }

    async fn get_state(&self, project: &str, workspace: &str) -> CoreResult<Option<ProjectConfig>> {
        Self::read(&self.state_path(project, workspace)).await
    }

    async fn save_state(&self, config: &ProjectConfig) -> CoreResult<()> {
        let path = self.state_path(&config.project, &config.workspace);
        Self::write(&path, config).await?;
        info!(
            "Saved applied state for {}/{} ({} packages, {} deploy)",
            config.project,
            config.workspace,
            config.packages.len(),
            config.deploy.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackageEntry;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_workspace_lifecycle() {
        let dir = tempdir().unwrap();
        let store = FileStore::in_home(dir.path());

        let created = store.create_workspace("dev").await.unwrap();
        let again = store.create_workspace("dev").await.unwrap();
        assert_eq!(created.id, again.id);

        store.set_env_var("dev", "REGION", "local:eu").await.unwrap();
        store.set_env_var("dev", "TIER", "local:free").await.unwrap();
        store.unset_env_var("dev", "TIER").await.unwrap();

        let env = store.get_workspace_env("dev").await.unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env["REGION"], "local:eu");

        store.delete_workspace("dev").await.unwrap();
        assert!(store.get_workspace("dev").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_workspace() {
        let dir = tempdir().unwrap();
        let store = FileStore::in_home(dir.path());
        let err = store.get_workspace_env("ghost").await.unwrap_err();
        assert!(matches!(err, CoreError::WorkspaceNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_workspace_packages_carry_env() {
        let dir = tempdir().unwrap();
        let store = FileStore::in_home(dir.path());
        store.create_workspace("dev").await.unwrap();

        let mut params = Parameters::new();
        params.insert("size".to_string(), json!("small"));
        let mut env = EnvMap::new();
        env.insert("DB_URL".to_string(), "local:postgres://x".to_string());

        store
            .add_package_to_workspace(
                "dev",
                "owner/db",
                WorkspacePackage {
                    version: String::new(),
                    parameters: params.clone(),
                },
                &env,
            )
            .await
            .unwrap();

        let ws = store.get_workspace("dev").await.unwrap().unwrap();
        assert_eq!(ws.packages["owner/db"].parameters, params);
        assert_eq!(ws.env["DB_URL"], "local:postgres://x");

        let err = store.delete_workspace("dev").await.unwrap_err();
        assert!(matches!(err, CoreError::Store(_)));

        store
            .remove_package_from_workspace("dev", "owner/db", &env)
            .await
            .unwrap();
        let ws = store.get_workspace("dev").await.unwrap().unwrap();
        assert!(ws.packages.is_empty());
        assert!(ws.env.is_empty());
    }

    #[tokio::test]
    async fn test_state_round_trip_per_workspace() {
        let dir = tempdir().unwrap();
        let store = FileStore::in_home(dir.path());

        let mut config = ProjectConfig::new("app", "dev");
        config
            .packages
            .insert("owner/db".to_string(), PackageEntry::default());
        store.save_state(&config).await.unwrap();

        assert_eq!(store.get_state("app", "dev").await.unwrap(), Some(config));
        assert!(store.get_state("app", "prod").await.unwrap().is_none());
    }
}
