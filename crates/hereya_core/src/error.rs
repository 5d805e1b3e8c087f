//! Error types for the core module.

use std::path::PathBuf;

use hereya_iac::IacError;
use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during package lifecycle operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid package format: {0}")]
    InvalidPackageFormat(String),

    #[error("Package manifest not found for {0}")]
    ManifestNotFound(String),

    #[error("Invalid package manifest for {package}: {message}")]
    InvalidManifest { package: String, message: String },

    #[error("Unsupported infrastructure type: {0}")]
    UnsupportedInfrastructureType(String),

    #[error("Unsupported IaC type: {0}")]
    UnsupportedIacType(String),

    #[error("{tool} failed with exit code {exit_code}: {stderr}")]
    ExternalToolFailure {
        tool: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Cannot resolve env value '{value}': {reason}")]
    EnvResolutionFailure { value: String, reason: String },

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Parameter file not found: {0}")]
    ParameterFileNotFound(PathBuf),

    #[error("Operation '{operation}' is not implemented for infrastructure '{infra}'")]
    NotImplemented { infra: String, operation: String },

    #[error("Project not initialized in {0}")]
    ProjectNotInitialized(PathBuf),

    #[error("Failed to fetch package source {uri}: {message}")]
    Fetch { uri: String, message: String },

    #[error("State store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IaC error: {0}")]
    Iac(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn not_implemented(infra: &str, operation: &str) -> Self {
        Self::NotImplemented {
            infra: infra.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Convert a runner error from a tool invoked directly by the core
    /// (cloud CLIs, git).
    pub(crate) fn from_runner(tool: &str, err: hereya_runner::RunnerError) -> Self {
        IacError::from_runner(tool, err).into()
    }
}

impl From<IacError> for CoreError {
    fn from(err: IacError) -> Self {
        match err {
            IacError::UnsupportedIacType(tag) => Self::UnsupportedIacType(tag),
            IacError::ExternalToolFailure {
                tool,
                exit_code,
                stderr,
            } => Self::ExternalToolFailure {
                tool,
                exit_code,
                stderr,
            },
            IacError::Io(e) => Self::Io(e),
            other => Self::Iac(other.to_string()),
        }
    }
}
