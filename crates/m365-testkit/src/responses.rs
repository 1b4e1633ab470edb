//! Canned single-shot responses keyed by verb and resource path.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use m365_graph::{GraphError, Method};
use serde_json::Value;

type Producer = Arc<dyn Fn() -> Result<Value, GraphError> + Send + Sync>;

/// Response registered for a `(method, path)` key.
///
/// Literals are cloned on every lookup. Producers are invoked on every
/// lookup, so a producer that captures shared state (a counter, a queue) can
/// answer each call differently.
#[derive(Clone)]
pub enum CannedResponse {
    Literal(Value),
    Producer(Producer),
}

impl CannedResponse {
    /// Wraps a zero-argument closure that builds the payload at lookup time.
    pub fn producer<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::Producer(Arc::new(move || Ok(f())))
    }

    /// Wraps a zero-argument closure that may fail, for simulating Graph
    /// errors.
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value, GraphError> + Send + Sync + 'static,
    {
        Self::Producer(Arc::new(f))
    }

    /// A response that always fails with the given Graph status.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::fallible(move || {
            Err(GraphError::Status {
                status,
                body: body.clone(),
            })
        })
    }

    /// Produces the payload for one lookup.
    ///
    /// # Errors
    ///
    /// Returns whatever error a fallible producer returns.
    pub fn resolve(&self) -> Result<Value, GraphError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Producer(produce) => produce(),
        }
    }
}

impl fmt::Debug for CannedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Producer(_) => f.debug_tuple("Producer").finish_non_exhaustive(),
        }
    }
}

impl From<Value> for CannedResponse {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

/// In-memory map from `(method, path)` to a [`CannedResponse`].
#[derive(Debug, Default)]
pub struct ResponseRegistry {
    entries: RwLock<HashMap<(Method, String), CannedResponse>>,
}

impl ResponseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a response, replacing any earlier one for the same key.
    pub fn register(
        &self,
        method: Method,
        path: impl Into<String>,
        response: impl Into<CannedResponse>,
    ) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert((method, path.into()), response.into());
    }

    /// Answers a request for `(method, path)`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnexpectedRequest`] if nothing is registered for
    /// the key, or the error of a fallible producer.
    pub fn resolve(&self, method: Method, path: &str) -> Result<Value, GraphError> {
        // Clone out of the lock so producers can touch the registry.
        let response = {
            let entries = self
                .entries
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.get(&(method, path.to_string())).cloned()
        };

        match response {
            Some(response) => response.resolve(),
            None => Err(GraphError::UnexpectedRequest {
                method,
                path: path.to_string(),
            }),
        }
    }

    pub fn contains(&self, method: Method, path: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(&(method, path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
