//! `m365-harness call` command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use m365_testkit::{ToolCaller, ToolOutput};
use serde_json::Value;

/// Arguments for the `call` command.
#[derive(Args)]
pub struct CallArgs {
    /// Tool name (e.g., "list_accounts").
    pub tool: String,

    /// Arguments JSON (inline or @file.json).
    pub input: String,

    /// Path to the harness configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn run(args: &CallArgs) -> Result<()> {
    let arguments = parse_input(&args.input)?;
    let config = super::load_config(args.config.as_deref())?;

    println!(
        "{} Calling tool: {}",
        style("→").cyan(),
        style(&args.tool).bold()
    );

    let session = super::connect(&config).await?;
    let output = session.call(&args.tool, arguments).await;
    session.close().await.context("failed to stop the bridge")?;
    let output = output.context("failed to call tool")?;

    print_output(&output)?;
    Ok(())
}

fn parse_input(input: &str) -> Result<Value> {
    let raw = match input.strip_prefix('@') {
        Some(path) => {
            let path = Path::new(path);
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read input file: {}", path.display()))?
        }
        None => input.to_string(),
    };

    let value: Value = serde_json::from_str(&raw).context("invalid input JSON")?;
    if !value.is_object() {
        anyhow::bail!("input must be a JSON object");
    }
    Ok(value)
}

fn print_output(output: &ToolOutput) -> Result<()> {
    if output.is_error {
        println!("{} Error: {}", style("✗").red().bold(), output.text());
        return Ok(());
    }

    match output.first_json() {
        Some(Value::String(text)) => {
            println!("{} Result:", style("✓").green().bold());
            println!("{text}");
        }
        Some(value) => {
            println!("{} Result:", style("✓").green().bold());
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => println!("{} No content returned", style("?").yellow().bold()),
    }
    Ok(())
}
