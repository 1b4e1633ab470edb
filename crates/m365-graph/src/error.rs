//! Errors produced by Graph clients.

use crate::Method;

/// Convenience alias used throughout the Graph request layer.
pub type Result<T, E = GraphError> = std::result::Result<T, E>;

/// Errors that can occur when issuing a Graph request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum GraphError {
    /// The client has no response for this verb and path.
    ///
    /// In-memory clients return this for every request a test did not
    /// register, so it always indicates a test-authoring mistake.
    #[error("unexpected request: {method} {path}")]
    UnexpectedRequest { method: Method, path: String },

    /// Graph answered with a non-success status.
    #[error("Microsoft Graph request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded into the requested type.
    #[error("failed to decode Graph response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
