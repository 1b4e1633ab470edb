//! `m365-harness tools` command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;

/// Arguments for the `tools` command.
#[derive(Args)]
pub struct ToolsArgs {
    /// Path to the harness configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the tool names as a JSON array.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: &ToolsArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let session = super::connect(&config).await?;

    let tools = session.list_tools().await;
    session.close().await.context("failed to stop the bridge")?;
    let mut tools = tools.context("failed to list tools")?;
    tools.sort();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    if tools.is_empty() {
        println!("{} No tools exposed", style("!").yellow().bold());
        return Ok(());
    }

    println!("{} {} tool(s):", style("✓").green().bold(), tools.len());
    for tool in &tools {
        println!("  {}", style(tool).cyan());
    }
    Ok(())
}
