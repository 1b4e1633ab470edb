//! MCP client session against a live bridge process.
//!
//! The bridge is spawned from the configured launcher with the Microsoft 365
//! credentials in its environment, and an MCP client is served over the
//! child's stdin/stdout. Tool calls are awaited one at a time.

use async_trait::async_trait;
use rmcp::{
    RoleClient,
    model::{CallToolRequestParam, CallToolResult},
    service::{RunningService, ServiceExt},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::{BridgeCredentials, LauncherConfig};

/// Errors that can occur while talking to the bridge.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// The launcher command could not be started.
    #[error("failed to spawn bridge `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The MCP handshake with the bridge failed.
    #[error("MCP initialization failed: {0}")]
    Initialize(String),

    /// The transport failed while a request was in flight.
    #[error("MCP request `{tool}` failed: {message}")]
    Service { tool: String, message: String },

    /// Tool arguments must be a JSON object (or null for none).
    #[error("arguments for `{tool}` must be a JSON object")]
    InvalidArguments { tool: String },

    /// The session did not shut down cleanly.
    #[error("failed to close MCP session: {0}")]
    Shutdown(String),
}

/// One content item of a tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    /// Text payload, if the item is textual.
    pub text: Option<String>,
}

impl ContentItem {
    /// Parses the text as JSON, falling back to a JSON string for raw text.
    pub fn json(&self) -> Option<Value> {
        let text = self.text.as_deref()?;
        Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
    }
}

/// Observable result of one tool call: an error flag and content items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub is_error: bool,
    pub contents: Vec<ContentItem>,
}

impl ToolOutput {
    /// Successful output with a single text item.
    pub fn text_success(text: impl Into<String>) -> Self {
        Self {
            is_error: false,
            contents: vec![ContentItem {
                text: Some(text.into()),
            }],
        }
    }

    /// Failed output with a single text item.
    pub fn text_error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text_success(text)
        }
    }

    /// JSON payload of the first textual item.
    pub fn first_json(&self) -> Option<Value> {
        self.contents.iter().find_map(ContentItem::json)
    }

    /// All text items joined by newlines.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(|item| item.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        let contents = result
            .content
            .iter()
            .map(|content| ContentItem {
                text: content.as_text().map(|text| text.text.clone()),
            })
            .collect();
        Self {
            is_error: result.is_error.unwrap_or(false),
            contents,
        }
    }
}

/// Anything that can invoke a bridge tool by name.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    /// Invokes `tool` with a JSON object of arguments.
    ///
    /// A tool that ran but reported failure is *not* an error here; check
    /// [`ToolOutput::is_error`].
    ///
    /// # Errors
    ///
    /// Returns an error if the call could not be delivered or answered.
    async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput, BridgeError>;
}

/// MCP client connected to a spawned bridge process.
pub struct BridgeSession {
    service: RunningService<RoleClient, ()>,
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession").finish_non_exhaustive()
    }
}

impl BridgeSession {
    /// Spawns the bridge and completes the MCP handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the launcher cannot be spawned or the handshake
    /// fails.
    #[instrument(skip_all, fields(command = %launcher.command))]
    pub async fn connect(
        launcher: &LauncherConfig,
        credentials: &BridgeCredentials,
    ) -> Result<Self, BridgeError> {
        let command = tokio::process::Command::new(&launcher.command).configure(|cmd| {
            cmd.args(&launcher.args);
            cmd.envs(&launcher.env);
            cmd.envs(credentials.env_pairs());
        });
        let transport = TokioChildProcess::new(command).map_err(|source| BridgeError::Spawn {
            command: launcher.command.clone(),
            source,
        })?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|err| BridgeError::Initialize(err.to_string()))?;

        info!(tenant = %credentials.tenant_id, "connected to bridge");
        Ok(Self { service })
    }

    /// Names of every tool the bridge exposes.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing request fails.
    pub async fn list_tools(&self) -> Result<Vec<String>, BridgeError> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|err| BridgeError::Service {
                tool: "tools/list".to_string(),
                message: err.to_string(),
            })?;
        Ok(tools.into_iter().map(|tool| tool.name.into_owned()).collect())
    }

    /// Cancels the session and waits for the bridge to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the service task failed while shutting down.
    pub async fn close(self) -> Result<(), BridgeError> {
        let reason = self
            .service
            .cancel()
            .await
            .map_err(|err| BridgeError::Shutdown(err.to_string()))?;
        debug!(?reason, "bridge session closed");
        Ok(())
    }
}

#[async_trait]
impl ToolCaller for BridgeSession {
    #[instrument(skip(self, arguments))]
    async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput, BridgeError> {
        let arguments = tool_arguments(tool, arguments)?;

        let result = self
            .service
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments,
            })
            .await
            .map_err(|err| BridgeError::Service {
                tool: tool.to_string(),
                message: err.to_string(),
            })?;

        let output = ToolOutput::from(result);
        debug!(is_error = output.is_error, items = output.contents.len(), "tool returned");
        Ok(output)
    }
}

/// Maps JSON arguments onto MCP tool arguments: an object passes through,
/// `null` means none, anything else is rejected.
fn tool_arguments(
    tool: &str,
    arguments: Value,
) -> Result<Option<Map<String, Value>>, BridgeError> {
    match arguments {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        _ => Err(BridgeError::InvalidArguments {
            tool: tool.to_string(),
        }),
    }
}
