//! hereya CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or package
//! - 3: Project or workspace state
//! - 5: IaC / external tool error

use std::process::ExitCode;

use clap::Parser;
use hereya_core::CoreError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, CliContext, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const STATE_ERROR: u8 = 3;
    pub const IAC_ERROR: u8 = 5;
}

fn init_logging(verbose: bool, quiet: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("hereya=debug,info")
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hereya=info,warn"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    // Ignore failure: a subscriber may already be installed.
    let _ = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet, cli.log_json);

    let ctx = match CliContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(ExitCodes::GENERAL_ERROR);
        }
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, &ctx).await,
        Commands::Add(args) => commands::add::execute(args, &ctx).await,
        Commands::Remove(args) => commands::remove::execute(args, &ctx).await,
        Commands::Up(args) => commands::up::up(args, &ctx).await,
        Commands::Down(args) => commands::up::down(args, &ctx).await,
        Commands::Deploy(args) => commands::deploy::deploy(args, &ctx).await,
        Commands::Undeploy(args) => commands::deploy::undeploy(args, &ctx).await,
        Commands::Env(args) => commands::env::execute(args, &ctx).await,
        Commands::Workspace(args) => commands::workspace::execute(args, &ctx).await,
        Commands::Bootstrap(args) => commands::bootstrap::bootstrap(args, &ctx).await,
        Commands::Unbootstrap(args) => commands::bootstrap::unbootstrap(args, &ctx).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let Some(core) = e.chain().find_map(|c| c.downcast_ref::<CoreError>()) else {
        return ExitCodes::GENERAL_ERROR;
    };

    match core {
        CoreError::InvalidPackageFormat(_)
        | CoreError::ManifestNotFound(_)
        | CoreError::InvalidManifest { .. }
        | CoreError::UnsupportedInfrastructureType(_)
        | CoreError::UnsupportedIacType(_)
        | CoreError::ParameterFileNotFound(_) => ExitCodes::INVALID_ARGS,
        CoreError::ProjectNotInitialized(_) | CoreError::WorkspaceNotFound(_) => {
            ExitCodes::STATE_ERROR
        }
        CoreError::ExternalToolFailure { .. }
        | CoreError::Iac(_)
        | CoreError::NotImplemented { .. }
        | CoreError::EnvResolutionFailure { .. } => ExitCodes::IAC_ERROR,
        _ => ExitCodes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_categorize_through_context() {
        let err = Err::<(), _>(CoreError::WorkspaceNotFound("dev".into()))
            .context("Failed to load workspace")
            .unwrap_err();
        assert_eq!(categorize_error(&err), ExitCodes::STATE_ERROR);

        let err = anyhow::Error::new(CoreError::ExternalToolFailure {
            tool: "terraform".into(),
            exit_code: 1,
            stderr: String::new(),
        });
        assert_eq!(categorize_error(&err), ExitCodes::IAC_ERROR);

        assert_eq!(
            categorize_error(&anyhow::anyhow!("something else")),
            ExitCodes::GENERAL_ERROR
        );
    }
}
