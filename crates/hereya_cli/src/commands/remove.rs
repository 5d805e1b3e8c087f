//! Remove command - destroy one package and drop it from the project.

use anyhow::{Context, Result};
use clap::Args;
use hereya_core::ProvisionInput;

use super::{require_workspace, resolved_workspace_env, update_snapshot, CliContext};

#[derive(Args)]
pub struct RemoveArgs {
    /// Package reference as written in hereya.yaml
    package: String,

    /// Workspace to destroy from (defaults to the project workspace)
    #[arg(short, long)]
    workspace: Option<String>,
}

pub async fn execute(args: RemoveArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.load_config().await?;
    if !config.packages.contains_key(&args.package) {
        anyhow::bail!("{} is not a package of this project", args.package);
    }
    let workspace_name = args.workspace.clone().unwrap_or_else(|| config.workspace.clone());

    let hereya = ctx.hereya();
    let workspace = require_workspace(&hereya, &workspace_name).await?;
    let persisted = workspace
        .packages
        .get(&args.package)
        .map(|p| p.parameters.clone())
        .unwrap_or_default();

    let input = ProvisionInput::new(&args.package, &workspace_name)
        .project(&config.project)
        .persisted_parameters(persisted)
        .env(resolved_workspace_env(&hereya, &workspace).await?)
        .project_root(&ctx.project_dir);
    let output = hereya
        .orchestrator
        .destroy_package(&input)
        .await
        .with_context(|| format!("Failed to destroy {}", args.package))?;

    hereya
        .project_env
        .remove_project_env(&workspace_name, &output.env)
        .await?;

    config.remove_package(&args.package, output.metadata.on_deploy.as_ref());
    config.save(&ctx.project_dir).await?;
    update_snapshot(&hereya, &config.project, &workspace_name, |snapshot| {
        snapshot.packages.remove(&args.package);
    })
    .await?;

    if !ctx.quiet {
        println!("✅ Removed {}", args.package);
    }
    Ok(())
}
