//! `m365-harness free-port` command implementation.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use m365_testkit::{PortGuard, PortGuardConfig};

/// Arguments for the `free-port` command.
///
/// Flags override the `[port_guard]` table of the harness configuration.
#[derive(Args)]
pub struct FreePortArgs {
    /// Port to free.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of listing checks.
    #[arg(short, long)]
    pub attempts: Option<u32>,

    /// Delay between checks, in milliseconds.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Path to the harness configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl FreePortArgs {
    fn guard_config(&self, base: PortGuardConfig) -> PortGuardConfig {
        PortGuardConfig {
            port: self.port.unwrap_or(base.port),
            attempts: self.attempts.unwrap_or(base.attempts),
            interval: self
                .interval_ms
                .map_or(base.interval, Duration::from_millis),
        }
    }
}

pub async fn run(args: &FreePortArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let guard = PortGuard::new(args.guard_config(config.port_guard));
    let port = guard.config().port;

    println!(
        "{} Freeing port {}",
        style("→").cyan(),
        style(port).bold()
    );

    let report = tokio::task::spawn_blocking(move || guard.clean())
        .await
        .context("port cleanup task panicked")?;

    if !report.terminated.is_empty() {
        let pids: Vec<String> = report.terminated.iter().map(ToString::to_string).collect();
        println!("  terminated: {}", pids.join(", "));
    }

    if report.port_free {
        println!(
            "{} Port {} is free ({} check(s))",
            style("✓").green().bold(),
            port,
            report.checks
        );
    } else {
        println!(
            "{} Port {} may still be in use after {} check(s)",
            style("!").yellow().bold(),
            port,
            report.checks
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> FreePortArgs {
        FreePortArgs {
            port: None,
            attempts: None,
            interval_ms: None,
            config: None,
        }
    }

    #[test]
    fn test_guard_config_keeps_base_without_flags() {
        let base = PortGuardConfig::default();
        assert_eq!(args().guard_config(base.clone()), base);
    }

    #[test]
    fn test_guard_config_flags_override_base() {
        let args = FreePortArgs {
            port: Some(9100),
            attempts: Some(1),
            interval_ms: Some(10),
            ..args()
        };

        let config = args.guard_config(PortGuardConfig::default());

        assert_eq!(config.port, 9100);
        assert_eq!(config.attempts, 1);
        assert_eq!(config.interval, Duration::from_millis(10));
    }
}
