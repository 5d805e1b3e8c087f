//! Init command - create the project manifest and backend records.

use anyhow::{Context, Result};
use clap::Args;
use hereya_core::{ProjectConfig, StateStore};
use tracing::info;

use super::CliContext;

#[derive(Args)]
pub struct InitArgs {
    /// Project name
    project: String,

    /// Default workspace for the project
    #[arg(short, long)]
    workspace: String,
}

pub async fn execute(args: InitArgs, ctx: &CliContext) -> Result<()> {
    if let Some(existing) = ProjectConfig::find(&ctx.project_dir) {
        anyhow::bail!("Project already initialized ({:?})", existing);
    }

    info!("Initializing project {} in {:?}", args.project, ctx.project_dir);
    let hereya = ctx.hereya();
    hereya
        .store
        .create_workspace(&args.workspace)
        .await
        .context("Failed to create workspace")?;
    hereya
        .store
        .create_project(&args.project, &args.workspace)
        .await
        .context("Failed to create project")?;

    let config = ProjectConfig::new(&args.project, &args.workspace);
    let path = config.save(&ctx.project_dir).await?;

    if !ctx.quiet {
        println!("✅ Initialized project {} (workspace: {})", args.project, args.workspace);
        println!("   {}", path.display());
    }
    Ok(())
}
