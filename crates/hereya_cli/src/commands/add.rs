//! Add command - provision one package and record it in the project.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use hereya_core::{PackageEntry, ProvisionInput};
use tracing::info;

use super::{
    collect_parameters, require_workspace, resolved_workspace_env, update_snapshot, CliContext,
};

#[derive(Args)]
pub struct AddArgs {
    /// Package reference (owner/repo or a local path)
    package: String,

    /// Parameter as key=value (repeatable)
    #[arg(short, long = "parameter")]
    parameter: Vec<String>,

    /// YAML file with parameters
    #[arg(short = 'f', long)]
    parameter_file: Option<PathBuf>,

    /// Workspace to provision into (defaults to the project workspace)
    #[arg(short, long)]
    workspace: Option<String>,
}

pub async fn execute(args: AddArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.load_config().await?;
    let workspace_name = args.workspace.clone().unwrap_or_else(|| config.workspace.clone());

    let hereya = ctx.hereya();
    let workspace = require_workspace(&hereya, &workspace_name).await?;
    let parameters = collect_parameters(args.parameter_file.as_ref(), &args.parameter).await?;

    let resolved = hereya
        .orchestrator
        .resolve_package(&args.package)
        .await
        .with_context(|| format!("Failed to resolve {}", args.package))?;
    if resolved.metadata.deploy {
        anyhow::bail!(
            "{} is a deploy package; reference it from a package's onDeploy instead",
            args.package
        );
    }

    let persisted = workspace
        .packages
        .get(&args.package)
        .map(|p| p.parameters.clone())
        .unwrap_or_default();
    let input = ProvisionInput::new(&args.package, &workspace_name)
        .project(&config.project)
        .parameters(parameters.clone())
        .persisted_parameters(persisted)
        .env(resolved_workspace_env(&hereya, &workspace).await?)
        .project_root(&ctx.project_dir);

    let output = hereya
        .orchestrator
        .provision_package(&input)
        .await
        .with_context(|| format!("Failed to provision {}", args.package))?;

    if !parameters.is_empty() {
        hereya
            .parameters
            .save_package_parameters(&output.package.canonical_name, Some(&workspace_name), &parameters)
            .await?;
    }
    hereya
        .project_env
        .add_project_env(&workspace_name, &output.env)
        .await?;

    config.add_package(&args.package, "", output.metadata.on_deploy.as_ref());
    config.save(&ctx.project_dir).await?;
    update_snapshot(&hereya, &config.project, &workspace_name, |snapshot| {
        snapshot
            .packages
            .insert(args.package.clone(), PackageEntry::default());
    })
    .await?;

    info!("Added {} to {}", args.package, config.project);
    if !ctx.quiet {
        println!("✅ Added {} ({} env values)", args.package, output.env.len());
        if let Some(companion) = &output.metadata.on_deploy {
            println!("   deploy companion: {}", companion.pkg);
        }
    }
    Ok(())
}
