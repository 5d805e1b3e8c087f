//! Env command - print the resolved project environment.

use anyhow::{Context, Result};
use clap::Args;
use hereya_core::mask_secrets;

use super::CliContext;

#[derive(Args)]
pub struct EnvArgs {
    /// Print only this variable
    name: Option<String>,

    /// Workspace (defaults to the project workspace)
    #[arg(short, long)]
    workspace: Option<String>,

    /// Print secret values instead of a mask
    #[arg(long)]
    show_secrets: bool,
}

pub async fn execute(args: EnvArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.load_config_for(args.workspace.as_deref()).await?;
    let hereya = ctx.hereya();

    let env = hereya
        .project_env
        .get_project_env(&config.workspace, &hereya.namespace, !args.show_secrets)
        .await
        .context("Failed to resolve project env")?;
    let env = if args.show_secrets {
        env
    } else {
        mask_secrets(&env)
    };

    match &args.name {
        Some(name) => {
            let value = env
                .get(name)
                .with_context(|| format!("{} is not set in workspace {}", name, config.workspace))?;
            println!("{}", value);
        }
        None => {
            for (key, value) in &env {
                println!("{}={}", key, value);
            }
        }
    }
    Ok(())
}
