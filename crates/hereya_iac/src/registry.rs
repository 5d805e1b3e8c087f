//! Registry mapping IaC tags to adapters.

use std::collections::HashMap;
use std::sync::Arc;

use hereya_runner::CommandRunner;
use tracing::debug;

use crate::adapter::IacAdapter;
use crate::cdk::CdkAdapter;
use crate::error::{IacError, IacResult};
use crate::terraform::TerraformAdapter;

/// A registry of IaC adapters, keyed by the `iac` tag of package manifests.
///
/// Populated once at startup; an unknown tag is a lookup miss.
#[derive(Default)]
pub struct IacRegistry {
    adapters: HashMap<String, Arc<dyn IacAdapter>>,
}

impl IacRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with the built-in `terraform` and `cdk` adapters.
    pub fn with_defaults(runner: Arc<dyn CommandRunner>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TerraformAdapter::new(runner.clone())));
        registry.register(Arc::new(CdkAdapter::new(runner)));
        registry
    }

    /// Register an adapter under its `name()`, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn IacAdapter>) {
        let name = adapter.name().to_string();
        debug!("Registering IaC adapter: {}", name);
        self.adapters.insert(name, adapter);
    }

    /// Get an adapter by tag.
    pub fn get(&self, name: &str) -> Option<Arc<dyn IacAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Get an adapter by tag, returning an error if not found.
    pub fn get_required(&self, name: &str) -> IacResult<Arc<dyn IacAdapter>> {
        self.get(name)
            .ok_or_else(|| IacError::UnsupportedIacType(name.to_string()))
    }

    /// All registered tags, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for IacRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IacRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hereya_runner::MockRunner;

    #[test]
    fn test_defaults_registered() {
        let registry = IacRegistry::with_defaults(Arc::new(MockRunner::new()));
        assert_eq!(registry.names(), vec!["cdk", "terraform"]);
        assert_eq!(registry.get_required("terraform").unwrap().name(), "terraform");
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let registry = IacRegistry::new();
        let err = registry.get_required("pulumi").err().unwrap();
        assert!(matches!(err, IacError::UnsupportedIacType(tag) if tag == "pulumi"));
    }
}
