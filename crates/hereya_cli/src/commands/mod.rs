//! CLI command definitions.
//!
//! Each subcommand loads what it needs from the project directory and the
//! hereya home, then drives the engine in `hereya_core`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hereya_core::{
    load_parameter_file, CoreError, EnvMap, Hereya, Parameters, ProgressEvent, ProgressHandler,
    ProjectConfig, Settings, StateStore, Workspace,
};

pub mod add;
pub mod bootstrap;
pub mod deploy;
pub mod env;
pub mod init;
pub mod remove;
pub mod up;
pub mod workspace;

/// hereya - declarative infrastructure packages for your project
#[derive(Parser)]
#[command(name = "hereya")]
#[command(version, about = "hereya - declarative infrastructure packages for your project")]
#[command(long_about = r#"
hereya provisions the infrastructure packages a project declares in
hereya.yaml into a workspace, and keeps exported configuration in sync.

COMMANDS:
  init        → Create hereya.yaml and the project/workspace records
  add         → Provision a package and record it in hereya.yaml
  remove      → Destroy a package and drop it from hereya.yaml
  up / down   → Reconcile / tear down the declared packages
  deploy      → Reconcile packages and deploy packages
  env         → Show the project environment
  workspace   → Manage workspaces, their env and installed packages

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or package
  3 - Project or workspace state
  5 - IaC / external tool error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project directory (defaults to the current directory)
    #[arg(short = 'C', long, global = true, env = "HEREYA_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print external commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a project in the current directory
    Init(init::InitArgs),

    /// Add a package to the project
    Add(add::AddArgs),

    /// Remove a package from the project
    Remove(remove::RemoveArgs),

    /// Provision the declared packages
    Up(up::UpArgs),

    /// Destroy the provisioned packages
    Down(up::UpArgs),

    /// Provision packages and deploy packages
    Deploy(deploy::DeployArgs),

    /// Destroy the deployed packages
    Undeploy(deploy::DeployArgs),

    /// Show the project environment
    Env(env::EnvArgs),

    /// Manage workspaces
    Workspace(workspace::WorkspaceArgs),

    /// Prepare an infrastructure backend
    Bootstrap(bootstrap::BootstrapArgs),

    /// Tear down what bootstrap created
    Unbootstrap(bootstrap::BootstrapArgs),
}

/// Options shared by every command.
pub struct CliContext {
    pub project_dir: PathBuf,
    pub settings: Settings,
    pub quiet: bool,
}

impl CliContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let project_dir = match &cli.project_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Cannot determine current directory")?,
        };
        let mut settings = Settings::from_env().context("Failed to read settings")?;
        if cli.dry_run {
            settings = settings.with_dry_run(true);
        }
        Ok(Self {
            project_dir,
            settings,
            quiet: cli.quiet,
        })
    }

    /// Engine context for the project directory.
    pub fn hereya(&self) -> Hereya {
        Hereya::builder(self.settings.clone(), &self.project_dir)
            .progress(progress_printer(self.quiet))
            .build()
    }

    pub async fn load_config(&self) -> Result<ProjectConfig> {
        ProjectConfig::load(&self.project_dir)
            .await
            .context("Run `hereya init` first")
    }

    /// Load the project config, switching workspace when one is given.
    pub async fn load_config_for(&self, workspace: Option<&str>) -> Result<ProjectConfig> {
        let mut config = self.load_config().await?;
        if let Some(ws) = workspace {
            config.workspace = ws.to_string();
        }
        Ok(config)
    }
}

/// Progress lines on stdout, unless quiet.
pub fn progress_printer(quiet: bool) -> ProgressHandler {
    Arc::new(move |event| {
        if quiet {
            return;
        }
        match event {
            ProgressEvent::PassStarted { to_add, to_remove } => {
                println!("Reconciling: {} to add, {} to remove", to_add, to_remove);
            }
            ProgressEvent::PackageStarted { package, action } => {
                println!("  → {} {}", action, package);
            }
            ProgressEvent::PackageFinished {
                package,
                action,
                exported,
            } => {
                println!("  ✓ {} {} ({} env values)", action, package, exported);
            }
            ProgressEvent::PackageFailed {
                package,
                action,
                error,
            } => {
                println!("  ✗ {} {}: {}", action, package, error);
            }
            ProgressEvent::PassFinished => println!("Done."),
        }
    })
}

/// Parse a `key=value` parameter. Values that parse as JSON keep their
/// type (`count=2`, `tags=["a"]`); anything else is a string.
pub fn parse_parameter(raw: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("Invalid parameter '{}': expected key=value", raw))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

/// Parameters from an optional file, then `-p` flags on top.
pub async fn collect_parameters(file: Option<&PathBuf>, flags: &[String]) -> Result<Parameters> {
    let mut parameters = match file {
        Some(path) => load_parameter_file(path)
            .await
            .with_context(|| format!("Failed to load parameters from {:?}", path))?,
        None => Parameters::new(),
    };
    for flag in flags {
        let (key, value) = parse_parameter(flag)?;
        parameters.insert(key, value);
    }
    Ok(parameters)
}

/// Fail with `WorkspaceNotFound` unless the workspace exists.
pub async fn require_workspace(hereya: &Hereya, name: &str) -> Result<Workspace> {
    let workspace = hereya
        .store
        .get_workspace(name)
        .await?
        .ok_or_else(|| CoreError::WorkspaceNotFound(name.to_string()))?;
    Ok(workspace)
}

/// Apply `update` to the applied-state snapshot of (project, workspace).
pub async fn update_snapshot<F>(hereya: &Hereya, project: &str, workspace: &str, update: F) -> Result<()>
where
    F: FnOnce(&mut ProjectConfig),
{
    let mut snapshot = hereya
        .store
        .get_state(project, workspace)
        .await?
        .unwrap_or_else(|| ProjectConfig::new(project, workspace));
    update(&mut snapshot);
    hereya.store.save_state(&snapshot).await?;
    Ok(())
}

/// Workspace env resolved to raw values for the IaC process.
pub async fn resolved_workspace_env(hereya: &Hereya, workspace: &Workspace) -> Result<EnvMap> {
    let env = hereya
        .namespace
        .resolve_all(&workspace.env, false)
        .await
        .context("Failed to resolve workspace env")?;
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_parameter_types() {
        assert_eq!(parse_parameter("count=2").unwrap(), ("count".into(), json!(2)));
        assert_eq!(
            parse_parameter("name=my db").unwrap(),
            ("name".into(), json!("my db"))
        );
        assert_eq!(
            parse_parameter("url=a=b").unwrap(),
            ("url".into(), json!("a=b"))
        );
        assert!(parse_parameter("novalue").is_err());
        assert!(parse_parameter("=x").is_err());
    }

    #[tokio::test]
    async fn test_missing_parameter_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("params.yaml");
        let err = collect_parameters(Some(&missing), &[]).await.unwrap_err();
        assert!(err
            .chain()
            .any(|c| matches!(c.downcast_ref::<CoreError>(), Some(CoreError::ParameterFileNotFound(_)))));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["hereya", "add", "owner/db", "-p", "size=small", "-w", "dev"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Add(_)));
    }
}
