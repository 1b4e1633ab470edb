//! `m365-harness smoke` command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use m365_testkit::{PortGuard, SmokeOutcome, run_live};

/// Arguments for the `smoke` command.
#[derive(Args)]
pub struct SmokeArgs {
    /// Path to the harness configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn run(args: &SmokeArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let guard = PortGuard::new(config.port_guard.clone());

    let guard = tokio::task::spawn_blocking(move || {
        guard.setup();
        guard
    })
    .await
    .context("port cleanup task panicked")?;

    println!("{} Running smoke scenario", style("→").cyan());
    let outcome = run_live(&config).await;

    tokio::task::spawn_blocking(move || guard.teardown())
        .await
        .context("port cleanup task panicked")?;

    match outcome.context("smoke scenario failed")? {
        SmokeOutcome::Passed(report) => {
            for step in &report.steps {
                println!("  {} {step}", style("✓").green());
            }
            println!(
                "{} Smoke scenario passed ({} account(s), event {}, file {})",
                style("✓").green().bold(),
                report.account_count,
                report.event_id,
                report.file_id
            );
        }
        SmokeOutcome::Skipped { reason } => {
            println!("{} Skipped: {reason}", style("-").yellow().bold());
        }
    }

    Ok(())
}
