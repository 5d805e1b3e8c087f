//! Up and down commands - reconcile the regular package set.

use anyhow::{Context, Result};
use clap::Args;
use hereya_core::{ReconcileMode, ReconcileReport};

use super::CliContext;

#[derive(Args)]
pub struct UpArgs {
    /// Workspace to reconcile (defaults to the project workspace)
    #[arg(short, long)]
    workspace: Option<String>,
}

pub async fn up(args: UpArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.load_config_for(args.workspace.as_deref()).await?;
    let report = ctx
        .hereya()
        .reconciler()
        .apply(&config, ReconcileMode::Up)
        .await
        .context("Failed to bring packages up")?;
    print_summary(ctx, &report);
    Ok(())
}

pub async fn down(args: UpArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.load_config_for(args.workspace.as_deref()).await?;
    let report = ctx
        .hereya()
        .reconciler()
        .down(&config)
        .await
        .context("Failed to tear packages down")?;
    print_summary(ctx, &report);
    Ok(())
}

pub(crate) fn print_summary(ctx: &CliContext, report: &ReconcileReport) {
    if ctx.quiet {
        return;
    }
    if report.provisioned.is_empty() && report.destroyed.is_empty() {
        println!("✅ Nothing to do");
        return;
    }
    for output in &report.destroyed {
        println!("  - {}", output.package.reference);
    }
    for output in &report.provisioned {
        println!("  + {}", output.package.reference);
    }
    println!(
        "✅ {} provisioned, {} destroyed",
        report.provisioned.len(),
        report.destroyed.len()
    );
}
