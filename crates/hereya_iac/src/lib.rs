//! # hereya_iac
//!
//! Infrastructure as Code tool adapters for hereya.
//!
//! Each adapter drives one external tool (terraform, the AWS CDK) as an
//! opaque process. The invocation is built deterministically from the package
//! parameters; the tool's structured outputs are parsed into a flat
//! environment map. Convergence and idempotence are left to the tool.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hereya_iac::{IacRegistry, IacRequest};
//! use hereya_runner::SystemRunner;
//!
//! # async fn run() -> hereya_iac::IacResult<()> {
//! let registry = IacRegistry::with_defaults(Arc::new(SystemRunner::default()));
//! let terraform = registry.get_required("terraform")?;
//!
//! let request = IacRequest::new("owner-repo", "/tmp/packages/owner-repo");
//! let env = terraform.apply(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cdk;
pub mod error;
pub mod outputs;
pub mod registry;
pub mod terraform;

pub use adapter::{EnvMap, IacAdapter, IacRequest, Parameters};
pub use cdk::CdkAdapter;
pub use error::{IacError, IacResult};
pub use outputs::{parse_cdk_outputs, parse_terraform_outputs, render_value};
pub use registry::IacRegistry;
pub use terraform::TerraformAdapter;
