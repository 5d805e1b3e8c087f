//! Local execution of a package's IaC module.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hereya_iac::{EnvMap, IacRegistry, IacRequest};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::CoreResult;
use crate::fetch::{ensure_checkout, package_dir, PackageFetcher};

use super::ProvisionRequest;

/// Parameter handed to deploy packages pointing at the project checkout.
pub const PROJECT_ROOT_PARAMETER: &str = "hereyaProjectRootDir";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Apply,
    Destroy,
}

/// Checks a package out under the hereya home and runs its IaC tool there.
pub struct PackageExecutor {
    iac: Arc<IacRegistry>,
    fetcher: Arc<dyn PackageFetcher>,
    root: PathBuf,
}

impl PackageExecutor {
    pub fn new(iac: Arc<IacRegistry>, fetcher: Arc<dyn PackageFetcher>, root: impl Into<PathBuf>) -> Self {
        Self {
            iac,
            fetcher,
            root: root.into(),
        }
    }

    /// Hereya home the executor materializes packages under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn apply(&self, request: &ProvisionRequest, extra_env: &EnvMap) -> CoreResult<EnvMap> {
        self.run(request, extra_env, Verb::Apply).await
    }

    pub async fn destroy(&self, request: &ProvisionRequest, extra_env: &EnvMap) -> CoreResult<EnvMap> {
        self.run(request, extra_env, Verb::Destroy).await
    }

    async fn run(&self, request: &ProvisionRequest, extra_env: &EnvMap, verb: Verb) -> CoreResult<EnvMap> {
        let iac = self.iac.get_required(&request.iac_type)?;

        let dir = package_dir(
            &self.root,
            request.project.as_deref(),
            &request.workspace,
            &request.canonical_name,
        );
        ensure_checkout(self.fetcher.as_ref(), &request.package_uri, &dir).await?;

        let mut env = request.env.clone();
        env.extend(extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut parameters = request.parameters.clone();
        if let Some(project_root) = &request.project_root {
            parameters.insert(
                PROJECT_ROOT_PARAMETER.to_string(),
                Value::String(project_root.to_string_lossy().into_owned()),
            );
        }
        debug!(
            "Running {} {:?} in {:?} with {} parameters",
            request.iac_type,
            verb,
            dir,
            parameters.len()
        );

        let iac_request = IacRequest::new(&request.canonical_name, &dir)
            .with_env(env)
            .with_parameters(parameters);

        let outputs = match verb {
            Verb::Apply => iac.apply(&iac_request).await?,
            Verb::Destroy => iac.destroy(&iac_request).await?,
        };
        info!(
            "{} {:?} finished with {} outputs",
            request.canonical_name,
            verb,
            outputs.len()
        );
        Ok(outputs)
    }
}
