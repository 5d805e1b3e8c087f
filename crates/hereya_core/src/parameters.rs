//! Package parameter resolution.
//!
//! Parameters for a package come from up to four places. From lowest to
//! highest precedence:
//!
//! 1. `hereyavars/<canonical>.yaml`
//! 2. `hereyavars/<canonical>.<workspace>.yaml`
//! 3. parameters persisted for the package in workspace state
//! 4. parameters supplied on the current invocation
//!
//! Missing sources count as empty. Merging is shallow: a later source
//! replaces a whole top-level key.

use std::path::{Path, PathBuf};

use hereya_iac::Parameters;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

/// Directory (relative to the project root) holding parameter files.
pub const PARAMETERS_DIR: &str = "hereyavars";

/// Merges parameter sources for a project checkout.
#[derive(Debug, Clone)]
pub struct ParameterResolver {
    project_root: PathBuf,
}

impl ParameterResolver {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Path of the package parameter file, optionally workspace scoped.
    pub fn parameter_file(&self, canonical_name: &str, workspace: Option<&str>) -> PathBuf {
        let file = match workspace {
            Some(ws) => format!("{}.{}.yaml", canonical_name, ws),
            None => format!("{}.yaml", canonical_name),
        };
        self.project_root.join(PARAMETERS_DIR).join(file)
    }

    /// Merged parameters from the two parameter files.
    pub async fn get_package_parameters(
        &self,
        canonical_name: &str,
        workspace: &str,
    ) -> CoreResult<Parameters> {
        let mut merged = read_optional(&self.parameter_file(canonical_name, None)).await?;
        merged.extend(read_optional(&self.parameter_file(canonical_name, Some(workspace))).await?);
        Ok(merged)
    }

    /// Full precedence chain for one package.
    pub async fn resolve(
        &self,
        canonical_name: &str,
        workspace: &str,
        persisted: &Parameters,
        user: &Parameters,
    ) -> CoreResult<Parameters> {
        let mut merged = self.get_package_parameters(canonical_name, workspace).await?;
        merged.extend(persisted.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
        debug!(
            "Resolved {} parameters for {} in {}",
            merged.len(),
            canonical_name,
            workspace
        );
        Ok(merged)
    }

    /// Merge `parameters` into the package parameter file and return its path.
    pub async fn save_package_parameters(
        &self,
        canonical_name: &str,
        workspace: Option<&str>,
        parameters: &Parameters,
    ) -> CoreResult<PathBuf> {
        let path = self.parameter_file(canonical_name, workspace);
        let mut existing = read_optional(&path).await?;
        existing.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_yaml::to_string(&existing)?).await?;
        info!("Saved parameters for {} to {:?}", canonical_name, path);
        Ok(path)
    }
}

/// Load a parameter file the user named explicitly; it must exist.
pub async fn load_parameter_file(path: &Path) -> CoreResult<Parameters> {
    if !path.is_file() {
        return Err(CoreError::ParameterFileNotFound(path.to_path_buf()));
    }
    parse(&tokio::fs::read_to_string(path).await?)
}

async fn read_optional(path: &Path) -> CoreResult<Parameters> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => parse(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Parameters::new()),
        Err(e) => Err(e.into()),
    }
}

fn parse(content: &str) -> CoreResult<Parameters> {
    if content.trim().is_empty() {
        return Ok(Parameters::new());
    }
    Ok(serde_yaml::from_str::<Option<Parameters>>(content)?.unwrap_or_default())
}
