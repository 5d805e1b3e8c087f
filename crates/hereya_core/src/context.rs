//! Runtime settings and the wired-up engine context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hereya_iac::{CdkAdapter, IacRegistry, TerraformAdapter};
use hereya_runner::{CommandRunner, SystemRunner, SystemRunnerOptions};
use tracing::debug;

use crate::env::EnvNamespace;
use crate::error::{CoreError, CoreResult};
use crate::fetch::{GitFetcher, PackageFetcher};
use crate::infrastructure::{AwsInfrastructure, InfrastructureRegistry, PackageExecutor};
use crate::orchestrator::ProvisioningOrchestrator;
use crate::package::{DefaultContentSource, PackageResolver, GITHUB_RAW_URL};
use crate::parameters::ParameterResolver;
use crate::progress::{noop, ProgressHandler};
use crate::project_env::ProjectEnv;
use crate::reconciler::StateReconciler;
use crate::store::{FileStore, StateStore};

/// Process-wide settings, normally read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root for package checkouts, local state and the file store.
    pub home: PathBuf,
    pub github_raw_url: String,
    pub dry_run: bool,
    pub aws_region: Option<String>,
    pub terraform_bin: String,
    pub npx_bin: String,
    pub git_bin: String,
}

impl Settings {
    /// Defaults rooted at `home`.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            github_raw_url: GITHUB_RAW_URL.to_string(),
            dry_run: false,
            aws_region: None,
            terraform_bin: "terraform".to_string(),
            npx_bin: "npx".to_string(),
            git_bin: "git".to_string(),
        }
    }

    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = match lookup("HEREYA_HOME") {
            Some(home) if !home.is_empty() => PathBuf::from(home),
            _ => dirs::home_dir()
                .map(|dir| dir.join(".hereya"))
                .ok_or_else(|| {
                    CoreError::Config("cannot determine home directory; set HEREYA_HOME".into())
                })?,
        };

        let mut settings = Self::new(home);
        if let Some(url) = lookup("HEREYA_GITHUB_RAW_URL") {
            settings.github_raw_url = url;
        }
        settings.dry_run = lookup("HEREYA_DRY_RUN")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        settings.aws_region = lookup("AWS_REGION").filter(|v| !v.is_empty());
        if let Some(bin) = lookup("HEREYA_TERRAFORM_BIN") {
            settings.terraform_bin = bin;
        }
        if let Some(bin) = lookup("HEREYA_NPX_BIN") {
            settings.npx_bin = bin;
        }
        if let Some(bin) = lookup("HEREYA_GIT_BIN") {
            settings.git_bin = bin;
        }
        Ok(settings)
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// The engine with all collaborators built once and shared.
pub struct Hereya {
    pub settings: Settings,
    pub project_root: PathBuf,
    pub runner: Arc<dyn CommandRunner>,
    pub iac: Arc<IacRegistry>,
    pub infra: Arc<InfrastructureRegistry>,
    pub store: Arc<dyn StateStore>,
    pub orchestrator: Arc<ProvisioningOrchestrator>,
    pub namespace: EnvNamespace,
    pub parameters: ParameterResolver,
    pub project_env: ProjectEnv,
    progress: ProgressHandler,
}

impl Hereya {
    pub fn builder(settings: Settings, project_root: impl Into<PathBuf>) -> HereyaBuilder {
        HereyaBuilder::new(settings, project_root)
    }

    /// Reconciler for the project this context was built for.
    pub fn reconciler(&self) -> StateReconciler {
        StateReconciler::new(
            self.orchestrator.clone(),
            self.store.clone(),
            self.namespace.clone(),
            &self.project_root,
        )
        .with_progress(self.progress.clone())
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

pub struct HereyaBuilder {
    settings: Settings,
    project_root: PathBuf,
    runner: Option<Arc<dyn CommandRunner>>,
    iac: Option<IacRegistry>,
    store: Option<Arc<dyn StateStore>>,
    progress: ProgressHandler,
}

impl HereyaBuilder {
    pub fn new(settings: Settings, project_root: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            project_root: project_root.into(),
            runner: None,
            iac: None,
            store: None,
            progress: noop(),
        }
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Replace the default terraform/cdk registry.
    pub fn iac_registry(mut self, registry: IacRegistry) -> Self {
        self.iac = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn progress(mut self, progress: ProgressHandler) -> Self {
        self.progress = progress;
        self
    }

    pub fn build(self) -> Hereya {
        let settings = self.settings;
        let runner = self.runner.unwrap_or_else(|| {
            let mut options = SystemRunnerOptions::new();
            if settings.dry_run {
                options = options.dry_run();
            }
            Arc::new(SystemRunner::new(options))
        });

        let iac = Arc::new(self.iac.unwrap_or_else(|| {
            let mut registry = IacRegistry::new();
            registry.register(Arc::new(
                TerraformAdapter::new(runner.clone()).with_binary(&settings.terraform_bin),
            ));
            registry.register(Arc::new(
                CdkAdapter::new(runner.clone()).with_binaries(&settings.npx_bin, "npm"),
            ));
            registry
        }));

        let fetcher: Arc<dyn PackageFetcher> =
            Arc::new(GitFetcher::new(runner.clone()).with_binary(&settings.git_bin));
        let executor = Arc::new(PackageExecutor::new(iac.clone(), fetcher, &settings.home));
        let aws = AwsInfrastructure::new(executor.clone(), runner.clone())
            .with_region(settings.aws_region.clone())
            .with_binaries("aws", &settings.npx_bin);
        let infra = Arc::new(InfrastructureRegistry::with_defaults(executor, aws));

        let source = DefaultContentSource::new(&self.project_root)
            .with_raw_base_url(&settings.github_raw_url);
        let resolver = Arc::new(PackageResolver::new(Arc::new(source), &self.project_root));
        let parameters = ParameterResolver::new(&self.project_root);
        let orchestrator = Arc::new(
            ProvisioningOrchestrator::new(resolver, infra.clone())
                .with_parameter_resolver(parameters.clone())
                .with_progress(self.progress.clone()),
        );

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileStore::in_home(&settings.home)));
        debug!(
            "Built context (home: {:?}, infra: {:?}, iac: {:?})",
            settings.home,
            infra.names(),
            iac.names()
        );

        Hereya {
            namespace: EnvNamespace::new(infra.clone()),
            project_env: ProjectEnv::new(&self.project_root),
            project_root: self.project_root,
            settings,
            runner,
            iac,
            infra,
            store,
            orchestrator,
            parameters,
            progress: self.progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_settings_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("HEREYA_HOME", "/tmp/hy"),
            ("HEREYA_DRY_RUN", "true"),
            ("AWS_REGION", "eu-west-1"),
            ("HEREYA_TERRAFORM_BIN", "tofu"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(settings.home, PathBuf::from("/tmp/hy"));
        assert!(settings.dry_run);
        assert_eq!(settings.aws_region.as_deref(), Some("eu-west-1"));
        assert_eq!(settings.terraform_bin, "tofu");
        assert_eq!(settings.git_bin, "git");
        assert_eq!(settings.github_raw_url, GITHUB_RAW_URL);
    }

    #[test]
    fn test_default_context_registries() {
        let hereya = Hereya::builder(Settings::new("/tmp/hy"), "/tmp/project").build();
        assert_eq!(hereya.infra.names(), vec!["aws", "local"]);
        assert_eq!(hereya.iac.names(), vec!["cdk", "terraform"]);
    }
}
