//! # hereya_runner
//!
//! External process execution for hereya.
//!
//! Every IaC tool, cloud CLI and git invocation the engine performs goes
//! through the [`CommandRunner`] trait, so the orchestration layers never
//! spawn processes directly and tests can substitute a [`MockRunner`].
//!
//! # Features
//!
//! - **System runner**: blocking `std::process` execution on the tokio
//!   blocking pool, with captured and optionally streamed output
//! - **Dry-run mode**: log commands without executing them
//! - **CI integration**: timestamped log lines when `CI` is set
//! - **Mock runner**: scripted responses and captured calls for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use hereya_runner::{CommandConfig, CommandRunner, SystemRunner, SystemRunnerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = SystemRunner::new(SystemRunnerOptions::default());
//!
//!     let config = CommandConfig::new("terraform")
//!         .arg("version")
//!         .workdir("/tmp");
//!
//!     let result = runner.run(&config).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod runner;
pub mod system;

pub use config::CommandConfig;
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use runner::{CommandRunner, ExecutionResult};
pub use system::{LogHandler, LogLine, LogStream, SystemRunner, SystemRunnerOptions};
