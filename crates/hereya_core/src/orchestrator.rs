//! Single-package provisioning façade.
//!
//! Resolves a package, merges its parameters, picks the backend named by
//! its manifest and drives it. Exported env comes back tagged with the
//! backend that produced it.
//!
//! The action follows the manifest's `deploy` flag:
//!
//! | request   | `deploy: false` | `deploy: true` |
//! |-----------|-----------------|----------------|
//! | provision | `provision`     | `deploy`       |
//! | destroy   | `destroy`       | `undeploy`     |
//!
//! After a successful deploy the env the package was deployed with is
//! handed to the backend's `save_env` under [`deployment_env_id`].

use std::path::PathBuf;
use std::sync::Arc;

use hereya_iac::{EnvMap, Parameters};
use tracing::{debug, error, info};

use crate::env::tag_env;
use crate::error::CoreResult;
use crate::infrastructure::{InfrastructureRegistry, ProvisionRequest};
use crate::package::{PackageMetadata, PackageResolver, ResolvedPackage};
use crate::parameters::ParameterResolver;
use crate::progress::{noop, PackageAction, ProgressEvent, ProgressHandler};

/// What to provision or destroy.
///
/// Built with [`ProvisionInput::new`] and the chained setters; everything but
/// the package reference and workspace is optional.
#[derive(Debug, Clone, Default)]
pub struct ProvisionInput {
    /// Package reference as written in `hereya.yaml`.
    pub package: String,
    /// Target workspace.
    pub workspace: String,
    /// Owning project, when the call comes from a project command.
    pub project: Option<String>,
    /// Parameters supplied on this invocation.
    pub parameters: Parameters,
    /// Parameters persisted for the package in workspace state.
    pub persisted_parameters: Parameters,
    /// Resolved (untagged) env handed to the IaC tool.
    pub env: EnvMap,
    /// Project checkout; only forwarded to deploy packages.
    pub project_root: Option<PathBuf>,
}

impl ProvisionInput {
    /// Input for `package` in `workspace` with no parameters or env.
    pub fn new(package: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            workspace: workspace.into(),
            ..Self::default()
        }
    }

    /// Set the owning project.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Parameters supplied on this invocation; they win over every file.
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Parameters recorded for the package in workspace state.
    pub fn persisted_parameters(mut self, parameters: Parameters) -> Self {
        self.persisted_parameters = parameters;
        self
    }

    /// Env handed to the IaC tool.
    pub fn env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    /// Project checkout, passed to deploy packages as `hereyaProjectRootDir`.
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }
}

/// Result of one package operation.
#[derive(Debug, Clone)]
pub struct ProvisionOutput {
    /// Exported env, every value tagged with the package's infra type.
    pub env: EnvMap,
    /// Manifest the package was resolved to.
    pub metadata: PackageMetadata,
    /// Canonical identity of the package.
    pub package: ResolvedPackage,
    /// Parameters the package was run with.
    pub parameters: Parameters,
}

/// Key under which a backend saves the env a deploy package was deployed
/// with: `<project>-<workspace>-<canonical>`, without the project part when
/// there is no project.
pub fn deployment_env_id(project: Option<&str>, workspace: &str, canonical_name: &str) -> String {
    match project {
        Some(project) => format!("{}-{}-{}", project, workspace, canonical_name),
        None => format!("{}-{}", workspace, canonical_name),
    }
}

/// Runs single package operations against the infrastructure registry.
///
/// Stateless between calls: the caller owns the workspace snapshot and the
/// project env file.
pub struct ProvisioningOrchestrator {
    resolver: Arc<PackageResolver>,
    infra: Arc<InfrastructureRegistry>,
    parameters: Option<ParameterResolver>,
    progress: ProgressHandler,
}

impl ProvisioningOrchestrator {
    /// Orchestrator without parameter files; only persisted and supplied
    /// parameters are merged.
    pub fn new(resolver: Arc<PackageResolver>, infra: Arc<InfrastructureRegistry>) -> Self {
        Self {
            resolver,
            infra,
            parameters: None,
            progress: noop(),
        }
    }

    /// Read parameter files from a project checkout.
    pub fn with_parameter_resolver(mut self, resolver: ParameterResolver) -> Self {
        self.parameters = Some(resolver);
        self
    }

    /// Report package start, finish and failure to `progress`.
    pub fn with_progress(mut self, progress: ProgressHandler) -> Self {
        self.progress = progress;
        self
    }

    /// Resolve a reference without running anything.
    pub async fn resolve_package(&self, reference: &str) -> CoreResult<ResolvedPackage> {
        self.resolver.resolve(reference).await
    }

    /// Provision (or deploy) a package and return its tagged env.
    pub async fn provision_package(&self, input: &ProvisionInput) -> CoreResult<ProvisionOutput> {
        self.run(input, false).await
    }

    /// Destroy (or undeploy) a package. The returned env lists the keys the
    /// package had exported, so the caller can drop them.
    pub async fn destroy_package(&self, input: &ProvisionInput) -> CoreResult<ProvisionOutput> {
        self.run(input, true).await
    }

    async fn merged_parameters(
        &self,
        canonical_name: &str,
        input: &ProvisionInput,
    ) -> CoreResult<Parameters> {
        match &self.parameters {
            Some(resolver) => {
                resolver
                    .resolve(
                        canonical_name,
                        &input.workspace,
                        &input.persisted_parameters,
                        &input.parameters,
                    )
                    .await
            }
            None => {
                let mut merged = input.persisted_parameters.clone();
                merged.extend(input.parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(merged)
            }
        }
    }

    async fn run(&self, input: &ProvisionInput, destroy: bool) -> CoreResult<ProvisionOutput> {
        let package = self.resolver.resolve(&input.package).await?;
        let metadata = package.metadata.clone();
        let adapter = self.infra.get_required(&metadata.infra)?;
        let parameters = self.merged_parameters(&package.canonical_name, input).await?;

        let action = match (destroy, metadata.deploy) {
            (false, false) => PackageAction::Provision,
            (false, true) => PackageAction::Deploy,
            (true, false) => PackageAction::Destroy,
            (true, true) => PackageAction::Undeploy,
        };

        let request = ProvisionRequest {
            canonical_name: package.canonical_name.clone(),
            package_uri: package.package_uri.clone(),
            iac_type: metadata.iac.clone(),
            parameters: parameters.clone(),
            env: input.env.clone(),
            project: input.project.clone(),
            workspace: input.workspace.clone(),
            project_root: if metadata.deploy {
                input.project_root.clone()
            } else {
                None
            },
        };

        info!("{} {} on {}", action, package.reference, metadata.infra);
        (self.progress)(ProgressEvent::PackageStarted {
            package: input.package.clone(),
            action,
        });

        let result = match action {
            PackageAction::Provision => adapter.provision(&request).await,
            PackageAction::Deploy => adapter.deploy(&request).await,
            PackageAction::Destroy => adapter.destroy(&request).await,
            PackageAction::Undeploy => adapter.undeploy(&request).await,
        };

        let result = match result {
            Ok(env) if action == PackageAction::Deploy => {
                let id = deployment_env_id(
                    input.project.as_deref(),
                    &input.workspace,
                    &package.canonical_name,
                );
                debug!("Saving deployment env of {} as {}", package.reference, id);
                adapter.save_env(&id, &input.env).await.map(|_| env)
            }
            other => other,
        };

        let env = match result {
            Ok(env) => env,
            Err(e) => {
                error!("Failed to {} {}: {}", action, input.package, e);
                (self.progress)(ProgressEvent::PackageFailed {
                    package: input.package.clone(),
                    action,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        (self.progress)(ProgressEvent::PackageFinished {
            package: input.package.clone(),
            action,
            exported: env.len(),
        });

        Ok(ProvisionOutput {
            env: tag_env(&env, &metadata.infra),
            metadata,
            package,
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::infrastructure::InfrastructureAdapter;
    use crate::package::{MockContentSource, PackageReference};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct FakeInfra {
        requests: Mutex<Vec<(String, ProvisionRequest)>>,
        saved: Mutex<Vec<(String, EnvMap)>>,
    }

    #[async_trait]
    impl InfrastructureAdapter for FakeInfra {
        fn name(&self) -> &str {
            "local"
        }

        async fn provision(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
            self.requests
                .lock()
                .push(("provision".to_string(), request.clone()));
            let mut env = EnvMap::new();
            env.insert("URL".to_string(), format!("http://{}", request.canonical_name));
            Ok(env)
        }

        async fn deploy(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
            self.requests
                .lock()
                .push(("deploy".to_string(), request.clone()));
            Ok(EnvMap::new())
        }

        async fn save_env(&self, id: &str, env: &EnvMap) -> CoreResult<()> {
            self.saved.lock().push((id.to_string(), env.clone()));
            Ok(())
        }

        async fn undeploy(&self, request: &ProvisionRequest) -> CoreResult<EnvMap> {
            self.requests
                .lock()
                .push(("undeploy".to_string(), request.clone()));
            Ok(EnvMap::new())
        }
    }

    fn orchestrator(manifest: &'static str, infra: Arc<FakeInfra>) -> ProvisioningOrchestrator {
        let mut source = MockContentSource::new();
        source
            .expect_read_file()
            .returning(move |_: &PackageReference, _| Ok(Some(manifest.to_string())));
        let resolver = PackageResolver::new(Arc::new(source), "/project");
        let mut registry = InfrastructureRegistry::new();
        registry.register(infra);
        ProvisioningOrchestrator::new(Arc::new(resolver), Arc::new(registry))
    }

    #[tokio::test]
    async fn test_provision_tags_env_and_merges_parameters() {
        let infra = Arc::new(FakeInfra::default());
        let orch = orchestrator("iac: terraform\ninfra: local\n", infra.clone());

        let mut persisted = Parameters::new();
        persisted.insert("a".to_string(), json!(1));
        persisted.insert("b".to_string(), json!(1));
        let mut user = Parameters::new();
        user.insert("a".to_string(), json!(2));

        let output = orch
            .provision_package(
                &ProvisionInput::new("owner/db", "dev")
                    .project("app")
                    .persisted_parameters(persisted)
                    .parameters(user),
            )
            .await
            .unwrap();

        assert_eq!(output.env["URL"], "local:http://owner-db");
        assert_eq!(output.parameters["a"], json!(2));
        assert_eq!(output.parameters["b"], json!(1));

        let requests = infra.requests.lock();
        assert_eq!(requests[0].0, "provision");
        assert_eq!(requests[0].1.iac_type, "terraform");
        assert_eq!(requests[0].1.project.as_deref(), Some("app"));
        assert!(requests[0].1.project_root.is_none());
    }

    #[tokio::test]
    async fn test_deploy_package_destroy_uses_undeploy() {
        let infra = Arc::new(FakeInfra::default());
        let orch = orchestrator("iac: cdk\ninfra: local\ndeploy: true\n", infra.clone());

        orch.destroy_package(&ProvisionInput::new("owner/app", "dev").project_root("/project"))
            .await
            .unwrap();

        let requests = infra.requests.lock();
        assert_eq!(requests[0].0, "undeploy");
        assert_eq!(
            requests[0].1.project_root.as_deref(),
            Some(std::path::Path::new("/project"))
        );
    }

    #[tokio::test]
    async fn test_deploy_saves_deployment_env() {
        let infra = Arc::new(FakeInfra::default());
        let orch = orchestrator("iac: cdk\ninfra: local\ndeploy: true\n", infra.clone());

        let mut env = EnvMap::new();
        env.insert("DB_URL".to_string(), "postgres://db".to_string());
        orch.provision_package(
            &ProvisionInput::new("owner/app", "dev")
                .project("shop")
                .env(env.clone()),
        )
        .await
        .unwrap();

        assert_eq!(infra.requests.lock()[0].0, "deploy");
        let saved = infra.saved.lock();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "shop-dev-owner-app");
        assert_eq!(saved[0].1, env);
    }

    #[tokio::test]
    async fn test_regular_provision_saves_nothing() {
        let infra = Arc::new(FakeInfra::default());
        let orch = orchestrator("iac: terraform\ninfra: local\n", infra.clone());

        orch.provision_package(&ProvisionInput::new("owner/db", "dev"))
            .await
            .unwrap();
        assert!(infra.saved.lock().is_empty());
    }

    #[test]
    fn test_deployment_env_id() {
        assert_eq!(deployment_env_id(Some("shop"), "dev", "pkgs-app"), "shop-dev-pkgs-app");
        assert_eq!(deployment_env_id(None, "dev", "pkgs-app"), "dev-pkgs-app");
    }

    #[tokio::test]
    async fn test_unknown_infra() {
        let infra = Arc::new(FakeInfra::default());
        let orch = orchestrator("iac: terraform\ninfra: azure\n", infra);

        let err = orch
            .provision_package(&ProvisionInput::new("owner/db", "dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedInfrastructureType(t) if t == "azure"));
    }

    #[tokio::test]
    async fn test_unimplemented_capability_surfaces() {
        let infra = Arc::new(FakeInfra::default());
        let orch = orchestrator("iac: terraform\ninfra: local\n", infra);

        let err = orch
            .destroy_package(&ProvisionInput::new("owner/db", "dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotImplemented { operation, .. } if operation == "destroy"));
    }
}
