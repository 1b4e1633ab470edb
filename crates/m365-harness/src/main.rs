//! Command-line driver for the Microsoft 365 MCP bridge test harness.
//!
//! Usage:
//! ```bash
//! m365-harness free-port              # Kill whatever listens on the bridge port
//! m365-harness smoke                  # Run the live smoke scenario
//! m365-harness tools                  # List the bridge's tools
//! m365-harness call <tool> <json>     # Invoke one tool
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "m365-harness")]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Free the bridge's local port
    FreePort(commands::free_port::FreePortArgs),

    /// Run the live smoke scenario against a spawned bridge
    Smoke(commands::smoke::SmokeArgs),

    /// List the tools the bridge exposes
    Tools(commands::tools::ToolsArgs),

    /// Call a bridge tool for testing
    Call(commands::call::CallArgs),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FreePort(_) => f.debug_tuple("FreePort").finish(),
            Self::Smoke(_) => f.debug_tuple("Smoke").finish(),
            Self::Tools(_) => f.debug_tuple("Tools").finish(),
            Self::Call(_) => f.debug_tuple("Call").finish(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().context("failed to parse log directive")?),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::FreePort(args) => commands::free_port::run(args).await,
        Command::Smoke(args) => commands::smoke::run(args).await,
        Command::Tools(args) => commands::tools::run(args).await,
        Command::Call(args) => commands::call::run(args).await,
    }
}
