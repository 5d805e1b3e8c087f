//! Project manifest (`hereya.yaml`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::package::OnDeploy;

/// Project manifest file names, in lookup order.
pub const PROJECT_FILES: [&str; 2] = ["hereya.yaml", "hereya.yml"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    #[serde(default)]
    pub version: String,
}

impl PackageEntry {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

/// Declared package set of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: String,
    pub workspace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub packages: BTreeMap<String, PackageEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deploy: BTreeMap<String, PackageEntry>,
}

impl ProjectConfig {
    pub fn new(project: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            workspace: workspace.into(),
            ..Self::default()
        }
    }

    /// Manifest path in `dir`, preferring `.yaml`.
    pub fn find(dir: &Path) -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    pub async fn load(dir: &Path) -> CoreResult<Self> {
        let path =
            Self::find(dir).ok_or_else(|| CoreError::ProjectNotInitialized(dir.to_path_buf()))?;
        debug!("Loading project config from {:?}", path);
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write back to the existing manifest, or `hereya.yaml` when none exists.
    pub async fn save(&self, dir: &Path) -> CoreResult<PathBuf> {
        let path = Self::find(dir).unwrap_or_else(|| dir.join(PROJECT_FILES[0]));
        tokio::fs::write(&path, serde_yaml::to_string(self)?).await?;
        Ok(path)
    }

    /// Record a package and, if it has one, its deployment companion.
    pub fn add_package(&mut self, reference: &str, version: &str, on_deploy: Option<&OnDeploy>) {
        self.packages
            .insert(reference.to_string(), PackageEntry::new(version));
        if let Some(companion) = on_deploy {
            self.deploy
                .insert(companion.pkg.clone(), PackageEntry::new(&companion.version));
        }
    }

    pub fn remove_package(&mut self, reference: &str, on_deploy: Option<&OnDeploy>) {
        self.packages.remove(reference);
        if let Some(companion) = on_deploy {
            self.deploy.remove(&companion.pkg);
        }
    }

    /// Copy with the regular package map emptied.
    pub fn without_packages(&self) -> Self {
        Self {
            packages: BTreeMap::new(),
            ..self.clone()
        }
    }

    /// Copy with the deploy map emptied.
    pub fn without_deploy(&self) -> Self {
        Self {
            deploy: BTreeMap::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_adding_twice_keeps_one_companion() {
        let mut config = ProjectConfig::new("app", "dev");
        let companion = OnDeploy {
            pkg: "owner/app-deploy".to_string(),
            version: String::new(),
        };

        config.add_package("owner/app", "", Some(&companion));
        config.add_package("owner/app", "", Some(&companion));

        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.deploy.len(), 1);

        config.remove_package("owner/app", Some(&companion));
        assert!(config.packages.is_empty());
        assert!(config.deploy.is_empty());
    }

    #[tokio::test]
    async fn test_missing_manifest_is_not_initialized() {
        let dir = tempdir().unwrap();
        let err = ProjectConfig::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, CoreError::ProjectNotInitialized(_)));
    }

    #[tokio::test]
    async fn test_yml_manifest_is_found_and_kept() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("hereya.yml"),
            "project: app\nworkspace: dev\npackages:\n  owner/db:\n    version: ''\n",
        )
        .unwrap();

        let mut config = ProjectConfig::load(dir.path()).await.unwrap();
        assert!(config.packages.contains_key("owner/db"));

        config.add_package("owner/cache", "", None);
        let path = config.save(dir.path()).await.unwrap();

        assert!(path.ends_with("hereya.yml"));
        assert!(!dir.path().join("hereya.yaml").exists());
        let reloaded = ProjectConfig::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.packages.len(), 2);
    }
}
