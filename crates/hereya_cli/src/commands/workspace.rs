//! Workspace commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use hereya_core::{mask_secrets, split, tag, ProvisionInput, StateStore, WorkspacePackage};

use super::{collect_parameters, require_workspace, resolved_workspace_env, CliContext};

#[derive(Args)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    command: WorkspaceCommand,
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    /// Create a workspace
    Create { name: String },

    /// Delete a workspace with no installed packages
    Delete { name: String },

    /// Manage workspace env vars
    Env(EnvArgs),

    /// Provision a package at workspace level
    Install(InstallArgs),

    /// Destroy a workspace-level package
    Uninstall(InstallArgs),
}

#[derive(Args)]
struct EnvArgs {
    #[command(subcommand)]
    command: EnvCommand,
}

#[derive(Subcommand)]
enum EnvCommand {
    /// Set a variable
    Set {
        /// Workspace name
        #[arg(short, long)]
        workspace: String,
        name: String,
        value: String,
        /// Infrastructure that resolves the value
        #[arg(short, long, default_value = "local")]
        infra: String,
        /// Store the value in the infrastructure's secret store
        #[arg(short, long)]
        secret: bool,
    },
    /// Unset a variable
    Unset {
        #[arg(short, long)]
        workspace: String,
        name: String,
        /// Also delete the value from the infrastructure's secret store
        #[arg(short, long)]
        secret: bool,
    },
    /// List variables
    List {
        #[arg(short, long)]
        workspace: String,
        #[arg(long)]
        show_secrets: bool,
    },
}

#[derive(Args)]
struct InstallArgs {
    /// Package reference
    package: String,

    #[arg(short, long)]
    workspace: String,

    /// Parameter as key=value (repeatable)
    #[arg(short, long = "parameter")]
    parameter: Vec<String>,

    /// YAML file with parameters
    #[arg(short = 'f', long)]
    parameter_file: Option<PathBuf>,
}

pub async fn execute(args: WorkspaceArgs, ctx: &CliContext) -> Result<()> {
    match args.command {
        WorkspaceCommand::Create { name } => {
            let workspace = ctx.hereya().store.create_workspace(&name).await?;
            if !ctx.quiet {
                println!("✅ Workspace {} ({})", workspace.name, workspace.id);
            }
        }
        WorkspaceCommand::Delete { name } => {
            ctx.hereya()
                .store
                .delete_workspace(&name)
                .await
                .with_context(|| format!("Failed to delete workspace {}", name))?;
            if !ctx.quiet {
                println!("✅ Deleted workspace {}", name);
            }
        }
        WorkspaceCommand::Env(env) => execute_env(env.command, ctx).await?,
        WorkspaceCommand::Install(args) => install(args, ctx).await?,
        WorkspaceCommand::Uninstall(args) => uninstall(args, ctx).await?,
    }
    Ok(())
}

async fn execute_env(command: EnvCommand, ctx: &CliContext) -> Result<()> {
    let hereya = ctx.hereya();
    match command {
        EnvCommand::Set {
            workspace,
            name,
            value,
            infra,
            secret,
        } => {
            require_workspace(&hereya, &workspace).await?;
            let raw = if secret {
                hereya
                    .infra
                    .get_required(&infra)?
                    .store_env(&name, &value)
                    .await
                    .with_context(|| format!("Failed to store {} in {}", name, infra))?
            } else {
                value
            };
            hereya
                .store
                .set_env_var(&workspace, &name, &tag(&raw, &infra))
                .await?;
        }
        EnvCommand::Unset {
            workspace,
            name,
            secret,
        } => {
            let ws = require_workspace(&hereya, &workspace).await?;
            if secret {
                if let Some(tagged) = ws.env.get(&name) {
                    let (infra, _) = split(tagged)?;
                    hereya
                        .infra
                        .get_required(infra)?
                        .unstore_env(&name)
                        .await
                        .with_context(|| format!("Failed to delete stored {}", name))?;
                }
            }
            hereya.store.unset_env_var(&workspace, &name).await?;
        }
        EnvCommand::List {
            workspace,
            show_secrets,
        } => {
            let ws = require_workspace(&hereya, &workspace).await?;
            let env = hereya.namespace.resolve_all(&ws.env, !show_secrets).await?;
            let env = if show_secrets { env } else { mask_secrets(&env) };
            for (key, value) in &env {
                println!("{}={}", key, value);
            }
        }
    }
    Ok(())
}

async fn install(args: InstallArgs, ctx: &CliContext) -> Result<()> {
    let hereya = ctx.hereya();
    let workspace = require_workspace(&hereya, &args.workspace).await?;
    let parameters = collect_parameters(args.parameter_file.as_ref(), &args.parameter).await?;

    let input = ProvisionInput::new(&args.package, &args.workspace)
        .parameters(parameters)
        .env(resolved_workspace_env(&hereya, &workspace).await?);
    let output = hereya
        .orchestrator
        .provision_package(&input)
        .await
        .with_context(|| format!("Failed to install {}", args.package))?;

    hereya
        .store
        .add_package_to_workspace(
            &args.workspace,
            &args.package,
            WorkspacePackage {
                version: String::new(),
                parameters: output.parameters.clone(),
            },
            &output.env,
        )
        .await?;

    if !ctx.quiet {
        println!(
            "✅ Installed {} in {} ({} env values)",
            args.package,
            args.workspace,
            output.env.len()
        );
    }
    Ok(())
}

async fn uninstall(args: InstallArgs, ctx: &CliContext) -> Result<()> {
    let hereya = ctx.hereya();
    let workspace = require_workspace(&hereya, &args.workspace).await?;
    let installed = workspace
        .packages
        .get(&args.package)
        .with_context(|| format!("{} is not installed in {}", args.package, args.workspace))?;

    let input = ProvisionInput::new(&args.package, &args.workspace)
        .persisted_parameters(installed.parameters.clone())
        .env(resolved_workspace_env(&hereya, &workspace).await?);
    let output = hereya
        .orchestrator
        .destroy_package(&input)
        .await
        .with_context(|| format!("Failed to uninstall {}", args.package))?;

    hereya
        .store
        .remove_package_from_workspace(&args.workspace, &args.package, &output.env)
        .await?;

    if !ctx.quiet {
        println!("✅ Uninstalled {} from {}", args.package, args.workspace);
    }
    Ok(())
}
