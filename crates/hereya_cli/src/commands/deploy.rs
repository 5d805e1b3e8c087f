//! Deploy and undeploy commands.

use anyhow::{Context, Result};
use clap::Args;
use hereya_core::ReconcileMode;

use super::up::print_summary;
use super::CliContext;

#[derive(Args)]
pub struct DeployArgs {
    /// Workspace to deploy to (defaults to the project workspace)
    #[arg(short, long)]
    workspace: Option<String>,
}

pub async fn deploy(args: DeployArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.load_config_for(args.workspace.as_deref()).await?;
    let report = ctx
        .hereya()
        .reconciler()
        .apply(&config, ReconcileMode::Deploy)
        .await
        .context("Deploy failed")?;
    print_summary(ctx, &report);
    Ok(())
}

pub async fn undeploy(args: DeployArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.load_config_for(args.workspace.as_deref()).await?;
    let report = ctx
        .hereya()
        .reconciler()
        .undeploy(&config)
        .await
        .context("Undeploy failed")?;
    print_summary(ctx, &report);
    Ok(())
}
