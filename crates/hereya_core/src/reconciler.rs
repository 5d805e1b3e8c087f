//! Declared-versus-applied reconciliation.
//!
//! A pass compares the project's declared package set against the last
//! snapshot that was fully applied. Removed packages are destroyed before new
//! ones are provisioned, and the declared set becomes the snapshot only once
//! every phase succeeded. Packages that finished before a failure keep their
//! env registration; nothing is rolled back.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use hereya_iac::EnvMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{PackageEntry, ProjectConfig};
use crate::env::EnvNamespace;
use crate::error::{CoreError, CoreResult};
use crate::orchestrator::{ProvisionInput, ProvisionOutput, ProvisioningOrchestrator};
use crate::progress::{noop, ProgressEvent, ProgressHandler};
use crate::project_env::ProjectEnv;
use crate::store::{StateStore, Workspace};

type PackageMap = BTreeMap<String, PackageEntry>;

/// Packages to provision and to destroy, keyed by package reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    /// Declared but not in the snapshot.
    pub to_add: PackageMap,
    /// In the snapshot but no longer declared.
    pub to_remove: PackageMap,
}

impl ReconcilePlan {
    /// True when the pass has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Key-wise set difference between the desired and previously applied maps.
///
/// Versions are not compared: a package whose version changed is neither
/// added nor removed. `reconcile(x, x)` is always empty.
pub fn reconcile(desired: &PackageMap, previous: &PackageMap) -> ReconcilePlan {
    let missing_from = |from: &PackageMap, other: &PackageMap| -> PackageMap {
        from.iter()
            .filter(|(name, _)| !other.contains_key(*name))
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    };

    ReconcilePlan {
        to_add: missing_from(desired, previous),
        to_remove: missing_from(previous, desired),
    }
}

/// Which maps of the project config a pass reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Regular packages only; the snapshot keeps its previous deploy map.
    Up,
    /// Regular and deploy packages.
    Deploy,
}

/// Outcome of a completed pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Plan for the `packages` map.
    pub packages: ReconcilePlan,
    /// Plan for the `deploy` map; empty in [`ReconcileMode::Up`].
    pub deploy: ReconcilePlan,
    /// Outputs of provisioned packages, in phase order.
    pub provisioned: Vec<ProvisionOutput>,
    /// Outputs of destroyed packages, in phase order.
    pub destroyed: Vec<ProvisionOutput>,
    /// Snapshot written at the end of the pass.
    pub snapshot: ProjectConfig,
}

/// Settings shared by every package operation of one phase.
struct Phase<'a> {
    config: &'a ProjectConfig,
    workspace: &'a Workspace,
    env: EnvMap,
    destroy: bool,
}

/// Drives the orchestrator over a reconcile plan for one workspace.
///
/// Phases run in a fixed order:
///
/// 1. removed deploy packages (undeploy)
/// 2. removed regular packages (destroy)
/// 3. added regular packages (provision)
/// 4. added deploy packages (deploy, with the project env and root)
///
/// Packages inside a phase are launched together. Each phase finishes before
/// the next starts, and a phase with a failure stops the pass.
pub struct StateReconciler {
    orchestrator: Arc<ProvisioningOrchestrator>,
    store: Arc<dyn StateStore>,
    namespace: EnvNamespace,
    project_env: ProjectEnv,
    project_root: PathBuf,
    progress: ProgressHandler,
}

impl StateReconciler {
    /// Reconciler for the project checked out at `project_root`.
    pub fn new(
        orchestrator: Arc<ProvisioningOrchestrator>,
        store: Arc<dyn StateStore>,
        namespace: EnvNamespace,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        let project_root = project_root.into();
        Self {
            orchestrator,
            store,
            namespace,
            project_env: ProjectEnv::new(&project_root),
            project_root,
            progress: noop(),
        }
    }

    /// Report pass start and end to `progress`.
    pub fn with_progress(mut self, progress: ProgressHandler) -> Self {
        self.progress = progress;
        self
    }

    /// Bring the workspace in line with `desired`.
    ///
    /// Fails with `WorkspaceNotFound` before touching anything when the
    /// workspace does not exist. On success the snapshot becomes `desired`
    /// (keeping the previous `deploy` map in [`ReconcileMode::Up`]).
    pub async fn apply(
        &self,
        desired: &ProjectConfig,
        mode: ReconcileMode,
    ) -> CoreResult<ReconcileReport> {
        let workspace = self
            .store
            .get_workspace(&desired.workspace)
            .await?
            .ok_or_else(|| CoreError::WorkspaceNotFound(desired.workspace.clone()))?;
        let previous = self
            .store
            .get_state(&desired.project, &desired.workspace)
            .await?
            .unwrap_or_else(|| ProjectConfig::new(&desired.project, &desired.workspace));

        let packages = reconcile(&desired.packages, &previous.packages);
        let deploy = match mode {
            ReconcileMode::Up => ReconcilePlan::default(),
            ReconcileMode::Deploy => reconcile(&desired.deploy, &previous.deploy),
        };
        info!(
            "Reconciling {}/{}: +{} -{} packages, +{} -{} deploy",
            desired.project,
            desired.workspace,
            packages.to_add.len(),
            packages.to_remove.len(),
            deploy.to_add.len(),
            deploy.to_remove.len()
        );
        (self.progress)(ProgressEvent::PassStarted {
            to_add: packages.to_add.len() + deploy.to_add.len(),
            to_remove: packages.to_remove.len() + deploy.to_remove.len(),
        });

        let workspace_env = self.namespace.resolve_all(&workspace.env, false).await?;
        let mut report = ReconcileReport {
            packages: packages.clone(),
            deploy: deploy.clone(),
            ..ReconcileReport::default()
        };

        if !deploy.to_remove.is_empty() {
            let env = self.deploy_env(&desired.workspace, &workspace_env).await?;
            let phase = Phase {
                config: desired,
                workspace: &workspace,
                env,
                destroy: true,
            };
            report
                .destroyed
                .extend(self.run_phase(&deploy.to_remove, &phase).await?);
        }

        let phase = Phase {
            config: desired,
            workspace: &workspace,
            env: workspace_env.clone(),
            destroy: true,
        };
        report
            .destroyed
            .extend(self.run_phase(&packages.to_remove, &phase).await?);

        let phase = Phase {
            destroy: false,
            ..phase
        };
        report
            .provisioned
            .extend(self.run_phase(&packages.to_add, &phase).await?);

        if !deploy.to_add.is_empty() {
            let env = self.deploy_env(&desired.workspace, &workspace_env).await?;
            let phase = Phase {
                config: desired,
                workspace: &workspace,
                env,
                destroy: false,
            };
            report
                .provisioned
                .extend(self.run_phase(&deploy.to_add, &phase).await?);
        }

        let snapshot = match mode {
            ReconcileMode::Up => ProjectConfig {
                deploy: previous.deploy.clone(),
                ..desired.clone()
            },
            ReconcileMode::Deploy => desired.clone(),
        };
        self.store.save_state(&snapshot).await?;
        (self.progress)(ProgressEvent::PassFinished);

        report.snapshot = snapshot;
        Ok(report)
    }

    /// Destroy every regular package of `config`.
    pub async fn down(&self, config: &ProjectConfig) -> CoreResult<ReconcileReport> {
        self.apply(&config.without_packages(), ReconcileMode::Up)
            .await
    }

    /// Destroy every deploy package of `config`.
    pub async fn undeploy(&self, config: &ProjectConfig) -> CoreResult<ReconcileReport> {
        self.apply(&config.without_deploy(), ReconcileMode::Deploy)
            .await
    }

    /// Env handed to deploy packages: workspace env under the resolved
    /// project env.
    async fn deploy_env(&self, workspace: &str, workspace_env: &EnvMap) -> CoreResult<EnvMap> {
        let mut env = workspace_env.clone();
        env.extend(
            self.project_env
                .get_project_env(workspace, &self.namespace, false)
                .await?,
        );
        Ok(env)
    }

    /// Run one phase concurrently, then register env sequentially.
    async fn run_phase(
        &self,
        packages: &PackageMap,
        phase: &Phase<'_>,
    ) -> CoreResult<Vec<ProvisionOutput>> {
        if packages.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "{} {} packages",
            if phase.destroy { "Destroying" } else { "Provisioning" },
            packages.len()
        );

        let inputs: Vec<ProvisionInput> = packages
            .keys()
            .map(|name| {
                let persisted = phase
                    .workspace
                    .packages
                    .get(name)
                    .map(|p| p.parameters.clone())
                    .unwrap_or_default();
                ProvisionInput::new(name, &phase.config.workspace)
                    .project(&phase.config.project)
                    .persisted_parameters(persisted)
                    .env(phase.env.clone())
                    .project_root(&self.project_root)
            })
            .collect();

        let results = join_all(inputs.iter().map(|input| async move {
            if phase.destroy {
                self.orchestrator.destroy_package(input).await
            } else {
                self.orchestrator.provision_package(input).await
            }
        }))
        .await;

        // Every success is registered even after a failure. A package error
        // is reported ahead of an env file error.
        let mut outputs = Vec::with_capacity(results.len());
        let mut package_error = None;
        let mut register_error = None;
        for (input, result) in inputs.iter().zip(results) {
            match result {
                Ok(output) => {
                    let registered = if phase.destroy {
                        self.project_env
                            .remove_project_env(&phase.config.workspace, &output.env)
                            .await
                    } else {
                        self.project_env
                            .add_project_env(&phase.config.workspace, &output.env)
                            .await
                    };
                    if let Err(e) = registered {
                        warn!("Failed to update env for {}: {}", input.package, e);
                        register_error.get_or_insert(e);
                    }
                    outputs.push(output);
                }
                Err(e) => {
                    warn!("{} failed: {}", input.package, e);
                    package_error.get_or_insert(e);
                }
            }
        }

        match package_error.or(register_error) {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> PackageMap {
        names
            .iter()
            .map(|n| (n.to_string(), PackageEntry::default()))
            .collect()
    }

    #[test]
    fn test_reconcile_difference() {
        let plan = reconcile(&set(&["A", "B"]), &set(&["A", "C"]));
        assert_eq!(plan.to_add, set(&["B"]));
        assert_eq!(plan.to_remove, set(&["C"]));
    }

    #[test]
    fn test_reconcile_identity_is_empty() {
        let x = set(&["A", "B", "C"]);
        assert!(reconcile(&x, &x).is_empty());
    }

    #[test]
    fn test_reconcile_from_nothing() {
        let plan = reconcile(&set(&["A"]), &PackageMap::new());
        assert_eq!(plan.to_add, set(&["A"]));
        assert!(plan.to_remove.is_empty());

        let plan = reconcile(&PackageMap::new(), &set(&["A"]));
        assert_eq!(plan.to_remove, set(&["A"]));
    }
}
