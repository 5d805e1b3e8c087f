//! # hereya_core
//!
//! Package lifecycle orchestration for hereya.
//!
//! A project declares infrastructure packages in `hereya.yaml`; this crate
//! turns that declaration into provisioned infrastructure for a workspace:
//!
//! - [`PackageResolver`] maps a reference (`owner/repo` or a local path) to
//!   a canonical name and its `hereyarc.yaml` manifest
//! - [`InfrastructureRegistry`] dispatches to a backend (`local`, `aws`)
//!   which checks the package out and runs its IaC tool
//! - [`ParameterResolver`] merges parameter files, persisted parameters and
//!   invocation parameters
//! - [`EnvNamespace`] tags exported values with their backend and resolves
//!   them back, secrets included
//! - [`ProvisioningOrchestrator`] drives a single package
//! - [`StateReconciler`] diffs the declared set against the last applied
//!   snapshot and drives the orchestrator over the difference
//!
//! [`Hereya`] wires everything together from [`Settings`].

pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod fetch;
pub mod infrastructure;
pub mod orchestrator;
pub mod package;
pub mod parameters;
pub mod progress;
pub mod project_env;
pub mod reconciler;
pub mod store;

pub use config::{PackageEntry, ProjectConfig};
pub use context::{Hereya, HereyaBuilder, Settings};
pub use env::{mask_secrets, split, tag, tag_env, EnvNamespace, SECRET_PREFIX};
pub use error::{CoreError, CoreResult};
pub use fetch::{ensure_checkout, package_dir, GitFetcher, PackageFetcher};
pub use infrastructure::{
    AwsInfrastructure, InfrastructureAdapter, InfrastructureRegistry, LocalInfrastructure,
    PackageExecutor, ProvisionRequest, ResolvedEnvValue,
};
pub use orchestrator::{deployment_env_id, ProvisionInput, ProvisionOutput, ProvisioningOrchestrator};
pub use package::{
    ContentSource, DefaultContentSource, OnDeploy, PackageMetadata, PackageReference,
    PackageResolver, PackageSource, ResolvedPackage,
};
pub use parameters::{load_parameter_file, ParameterResolver};
pub use progress::{PackageAction, ProgressEvent, ProgressHandler};
pub use project_env::ProjectEnv;
pub use reconciler::{reconcile, ReconcileMode, ReconcilePlan, ReconcileReport, StateReconciler};
pub use store::{FileStore, Project, StateStore, Workspace, WorkspacePackage};

pub use hereya_iac::{EnvMap, Parameters};
