//! Test fixtures for the Microsoft 365 MCP bridge.
//!
//! This crate collects everything the bridge's test suites share:
//!
//! - **In-memory Graph client**: [`MockGraphClient`] answers single requests
//!   from a [`ResponseRegistry`] and paginated listings from a
//!   [`PageQueueRegistry`], so code written against
//!   [`m365_graph::GraphClient`] can be tested without a network.
//! - **Port guard**: [`PortGuard`] frees the bridge's fixed local port before
//!   and after a session.
//! - **Bridge session**: [`BridgeSession`] spawns the bridge and talks MCP to
//!   it over stdio.
//! - **Smoke scenario**: [`SmokeScenario`] drives every tool family once
//!   against a live bridge, skipping when no credentials are configured.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use m365_graph::Method;
//! use m365_testkit::MockGraphClient;
//! use serde_json::json;
//!
//! let mock = Arc::new(MockGraphClient::new());
//! mock.register(Method::Get, "/me", json!({"userPrincipalName": "me@example.com"}));
//! mock.register_page("/me/messages", vec![json!({"id": "m1"})]);
//!
//! let client = mock.shared(); // inject wherever a SharedGraphClient is expected
//! ```

mod bridge;
pub mod config;
mod logging;
mod mock;
mod pages;
mod port_guard;
mod responses;
mod scenario;


pub use bridge::{BridgeError, BridgeSession, ContentItem, ToolCaller, ToolOutput};
pub use config::{BridgeCredentials, ConfigError, HarnessConfig, LauncherConfig, ScenarioConfig};
pub use logging::init_test_logging;
pub use mock::{CallKind, MockGraphClient, RecordedCall};
pub use pages::PageQueueRegistry;
pub use port_guard::{
    CleanupReport, PortGuard, PortGuardConfig, ProcessTable, SystemProcessTable, parse_listing,
    parse_pid,
};
pub use responses::{CannedResponse, ResponseRegistry};
pub use scenario::{ScenarioError, SmokeOutcome, SmokeReport, SmokeScenario, run_live};
