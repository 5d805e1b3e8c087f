//! Bootstrap and unbootstrap commands.

use anyhow::{Context, Result};
use clap::Args;

use super::CliContext;

#[derive(Args)]
pub struct BootstrapArgs {
    /// Infrastructure type (local, aws)
    infra: String,
}

pub async fn bootstrap(args: BootstrapArgs, ctx: &CliContext) -> Result<()> {
    let hereya = ctx.hereya();
    let adapter = hereya.infra.get_required(&args.infra)?;
    adapter
        .bootstrap()
        .await
        .with_context(|| format!("Failed to bootstrap {}", args.infra))?;
    if !ctx.quiet {
        println!("✅ Bootstrapped {}", args.infra);
    }
    Ok(())
}

pub async fn unbootstrap(args: BootstrapArgs, ctx: &CliContext) -> Result<()> {
    let hereya = ctx.hereya();
    let adapter = hereya.infra.get_required(&args.infra)?;
    adapter
        .unbootstrap()
        .await
        .with_context(|| format!("Failed to unbootstrap {}", args.infra))?;
    if !ctx.quiet {
        println!("✅ Unbootstrapped {}", args.infra);
    }
    Ok(())
}
