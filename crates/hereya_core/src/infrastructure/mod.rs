//! Infrastructure backends.
//!
//! An infrastructure adapter owns the backend specific parts of running a
//! package and of resolving exported values (secrets included) back into real
//! values. Adapters are looked up by the `infra` tag of a package manifest.

mod aws;
mod executor;
mod local;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hereya_iac::{EnvMap, Parameters};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

pub use aws::{AwsInfrastructure, SSM_PREFIX};
pub use executor::{PackageExecutor, PROJECT_ROOT_PARAMETER};
pub use local::LocalInfrastructure;

/// Input to provision/destroy/deploy/undeploy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub canonical_name: String,
    pub package_uri: String,
    pub iac_type: String,
    pub parameters: Parameters,
    /// Environment handed to the IaC process.
    pub env: EnvMap,
    pub project: Option<String>,
    pub workspace: String,
    /// Set for deploy packages, which build from the project checkout.
    pub project_root: Option<PathBuf>,
}

/// A resolved exported value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnvValue {
    pub value: String,
    pub is_secret: bool,
}

impl ResolvedEnvValue {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_secret: false,
        }
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_secret: true,
        }
    }
}

/// Backend capability set.
///
/// Every capability defaults to [`CoreError::NotImplemented`]; backends
/// override what they support.
#[async_trait]
pub trait InfrastructureAdapter: Send + Sync {
    /// Registry tag (e.g. `local`).
    fn name(&self) -> &str;

    async fn provision(&self, _request: &ProvisionRequest) -> CoreResult<EnvMap> {
        Err(CoreError::not_implemented(self.name(), "provision"))
    }

    async fn destroy(&self, _request: &ProvisionRequest) -> CoreResult<EnvMap> {
        Err(CoreError::not_implemented(self.name(), "destroy"))
    }

    async fn deploy(&self, _request: &ProvisionRequest) -> CoreResult<EnvMap> {
        Err(CoreError::not_implemented(self.name(), "deploy"))
    }

    async fn undeploy(&self, _request: &ProvisionRequest) -> CoreResult<EnvMap> {
        Err(CoreError::not_implemented(self.name(), "undeploy"))
    }

    async fn bootstrap(&self) -> CoreResult<()> {
        Err(CoreError::not_implemented(self.name(), "bootstrap"))
    }

    async fn unbootstrap(&self) -> CoreResult<()> {
        Err(CoreError::not_implemented(self.name(), "unbootstrap"))
    }

    /// Turn a stored raw value into the value a consumer sees.
    async fn resolve_env(&self, _value: &str) -> CoreResult<ResolvedEnvValue> {
        Err(CoreError::not_implemented(self.name(), "resolveEnv"))
    }

    /// Persist an env map under `id` in the backend.
    async fn save_env(&self, _id: &str, _env: &EnvMap) -> CoreResult<()> {
        Err(CoreError::not_implemented(self.name(), "saveEnv"))
    }

    /// Store a single value and return the reference that resolves to it.
    async fn store_env(&self, _name: &str, _value: &str) -> CoreResult<String> {
        Err(CoreError::not_implemented(self.name(), "storeEnv"))
    }

    async fn unstore_env(&self, _name: &str) -> CoreResult<()> {
        Err(CoreError::not_implemented(self.name(), "unstoreEnv"))
    }
}

/// Infra tag → adapter.
#[derive(Default)]
pub struct InfrastructureRegistry {
    adapters: HashMap<String, Arc<dyn InfrastructureAdapter>>,
}

impl InfrastructureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `local` and `aws` backends sharing one executor.
    pub fn with_defaults(executor: Arc<PackageExecutor>, aws: AwsInfrastructure) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalInfrastructure::new(executor)));
        registry.register(Arc::new(aws));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn InfrastructureAdapter>) {
        let name = adapter.name().to_string();
        debug!("Registering infrastructure adapter: {}", name);
        self.adapters.insert(name, adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn InfrastructureAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn get_required(&self, name: &str) -> CoreResult<Arc<dyn InfrastructureAdapter>> {
        self.get(name)
            .ok_or_else(|| CoreError::UnsupportedInfrastructureType(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for InfrastructureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfrastructureRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    #[async_trait]
    impl InfrastructureAdapter for Bare {
        fn name(&self) -> &str {
            "bare"
        }
    }

    #[tokio::test]
    async fn test_unimplemented_capability_is_an_error() {
        let err = Bare.store_env("KEY", "value").await.unwrap_err();
        match err {
            CoreError::NotImplemented { infra, operation } => {
                assert_eq!(infra, "bare");
                assert_eq!(operation, "storeEnv");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_infra_is_unsupported() {
        let mut registry = InfrastructureRegistry::new();
        registry.register(Arc::new(Bare));

        assert!(registry.get_required("bare").is_ok());
        let err = registry.get_required("gcp").err().unwrap();
        assert!(matches!(err, CoreError::UnsupportedInfrastructureType(t) if t == "gcp"));
    }
}
