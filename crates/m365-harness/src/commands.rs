//! CLI command implementations for `m365-harness`.
//!
//! - **`free-port`**: Clear the bridge's local port
//! - **`smoke`**: Run the live smoke scenario with port cleanup around it
//! - **`tools`**: List the tools a freshly spawned bridge exposes
//! - **`call`**: Invoke a single bridge tool with JSON arguments
//!
//! Each command module exports an `*Args` struct implementing `clap::Args`
//! and a `run` function that the main CLI dispatches to.

use std::path::Path;

use anyhow::{Context, Result};
use m365_testkit::{BridgeCredentials, BridgeSession, HarnessConfig, config::load_env_file};

pub mod call;
pub mod free_port;
pub mod smoke;
pub mod tools;

pub(crate) fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    HarnessConfig::resolve(path).context("failed to load harness configuration")
}

/// Loads the environment file and spawns a bridge session.
pub(crate) async fn connect(config: &HarnessConfig) -> Result<BridgeSession> {
    load_env_file();
    let credentials = BridgeCredentials::from_env().with_context(|| {
        format!(
            "{} must be set to talk to the bridge",
            m365_testkit::config::CLIENT_ID_ENV
        )
    })?;
    BridgeSession::connect(&config.launcher, &credentials)
        .await
        .context("failed to start the bridge")
}
