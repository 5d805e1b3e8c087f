//! Progress callbacks for package operations.
//!
//! The orchestrator and reconciler call a [`ProgressHandler`] synchronously
//! as work starts and ends. Handlers run on the task that drives the pass,
//! so they should return quickly.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Backend operation run for one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageAction {
    /// Regular package, created or updated.
    Provision,
    /// Regular package, torn down.
    Destroy,
    /// Deploy package, created or updated.
    Deploy,
    /// Deploy package, torn down.
    Undeploy,
}

impl fmt::Display for PackageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Provision => "provision",
            Self::Destroy => "destroy",
            Self::Deploy => "deploy",
            Self::Undeploy => "undeploy",
        };
        f.write_str(s)
    }
}

/// Something that happened during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A reconcile pass computed its plan; counts cover both maps.
    PassStarted {
        to_add: usize,
        to_remove: usize,
    },
    /// A backend operation was launched.
    PackageStarted {
        package: String,
        action: PackageAction,
    },
    /// A backend operation returned `exported` env values.
    PackageFinished {
        package: String,
        action: PackageAction,
        exported: usize,
    },
    /// A backend operation failed; the pass will stop after this phase.
    PackageFailed {
        package: String,
        action: PackageAction,
        error: String,
    },
    /// The snapshot was saved.
    PassFinished,
}

/// Callback receiving [`ProgressEvent`]s.
pub type ProgressHandler = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Handler that ignores every event.
pub fn noop() -> ProgressHandler {
    Arc::new(|_| {})
}
