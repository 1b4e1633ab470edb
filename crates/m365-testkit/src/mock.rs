//! In-memory [`GraphClient`] backed by the response and page registries.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use m365_graph::{
    GraphClient, Method, QueryParams, RecordStream, RequestOptions, Result, SharedGraphClient,
};
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::{CannedResponse, PageQueueRegistry, ResponseRegistry};

/// Which interception path served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Single,
    Paginated,
}

/// One call served by a [`MockGraphClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    /// `None` for paginated calls, which have no verb.
    pub method: Option<Method>,
    pub path: String,
    pub account_id: Option<String>,
}

/// Graph client that answers from registered fixtures instead of the
/// network.
///
/// Build one per test, register what the code under test is expected to
/// request, and inject it with [`MockGraphClient::shared`]. Single requests
/// that were not registered fail with
/// [`m365_graph::GraphError::UnexpectedRequest`]; paginated requests for
/// unknown or exhausted paths return an empty stream.
#[derive(Debug, Default)]
pub struct MockGraphClient {
    responses: ResponseRegistry,
    pages: PageQueueRegistry,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockGraphClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the response for `(method, path)`, replacing any earlier
    /// one.
    pub fn register(
        &self,
        method: Method,
        path: impl Into<String>,
        response: impl Into<CannedResponse>,
    ) -> &Self {
        self.responses.register(method, path, response);
        self
    }

    /// Queues one page for the next paginated request of `path`.
    pub fn register_page(&self, path: impl Into<String>, page: Vec<Value>) -> &Self {
        self.pages.register(path, page);
        self
    }

    pub fn responses(&self) -> &ResponseRegistry {
        &self.responses
    }

    pub fn pages(&self) -> &PageQueueRegistry {
        &self.pages
    }

    /// Calls served so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Wraps the client for injection into code that takes a
    /// [`SharedGraphClient`].
    pub fn shared(self: &Arc<Self>) -> SharedGraphClient {
        Arc::clone(self) as SharedGraphClient
    }

    fn record(&self, kind: CallKind, method: Option<Method>, path: &str, account_id: Option<&str>) {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedCall {
                kind,
                method,
                path: path.to_string(),
                account_id: account_id.map(ToString::to_string),
            });
    }
}

#[async_trait]
impl GraphClient for MockGraphClient {
    #[instrument(skip(self, _options))]
    async fn request(
        &self,
        method: Method,
        path: &str,
        account_id: Option<&str>,
        _options: RequestOptions,
    ) -> Result<Value> {
        self.record(CallKind::Single, Some(method), path, account_id);
        let result = self.responses.resolve(method, path);
        if let Err(err) = &result {
            error!(%err, "mock graph client could not answer request");
        }
        result
    }

    #[instrument(skip(self, _params))]
    async fn request_paginated(
        &self,
        path: &str,
        account_id: Option<&str>,
        _params: Option<&QueryParams>,
        _limit: Option<usize>,
    ) -> Result<RecordStream> {
        self.record(CallKind::Paginated, None, path, account_id);
        let remaining = self.pages.remaining(path);
        debug!(remaining, "serving queued page");
        Ok(self.pages.pop_stream(path))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use m365_graph::{GraphClientExt, GraphError};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_request_answers_from_registry_and_ignores_options() {
        let mock = MockGraphClient::new();
        mock.register(Method::Post, "/me/sendMail", Value::Null);

        let options = RequestOptions::default()
            .with_json(json!({"message": {"subject": "hi"}}))
            .with_header("Prefer", "outlook.timezone=\"UTC\"");
        let value = mock
            .request(Method::Post, "/me/sendMail", Some("acct-1"), options)
            .await
            .unwrap();

        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_unregistered_request_fails() {
        let mock = MockGraphClient::new();

        let err = mock
            .request(Method::Get, "/me/mailFolders", None, RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            GraphError::UnexpectedRequest {
                method: Method::Get,
                path: "/me/mailFolders".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_paginated_requests_pop_one_page_per_call() {
        let mock = MockGraphClient::new();
        mock.register_page("/me/messages", vec![json!({"id": "a"}), json!({"id": "b"})])
            .register_page("/me/messages", vec![json!({"id": "c"})]);

        let mut pages = Vec::new();
        for _ in 0..3 {
            let stream = mock
                .request_paginated("/me/messages", None, None, None)
                .await
                .unwrap();
            let page: Vec<_> = stream.map(std::result::Result::unwrap).collect().await;
            pages.push(page);
        }

        assert_eq!(
            pages,
            vec![
                vec![json!({"id": "a"}), json!({"id": "b"})],
                vec![json!({"id": "c"})],
                vec![],
            ]
        );
    }

    #[tokio::test]
    async fn test_calls_are_recorded_with_account() {
        let mock = MockGraphClient::new();
        mock.register(Method::Get, "/me", json!({"id": "me"}));

        let _: Value = mock.get_json("/me", Some("acct-9")).await.unwrap();
        let _ = mock
            .collect_records("/me/events", None, None, None)
            .await
            .unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                RecordedCall {
                    kind: CallKind::Single,
                    method: Some(Method::Get),
                    path: "/me".to_string(),
                    account_id: Some("acct-9".to_string()),
                },
                RecordedCall {
                    kind: CallKind::Paginated,
                    method: None,
                    path: "/me/events".to_string(),
                    account_id: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_registries_expose_unconsumed_fixtures() {
        let mock = MockGraphClient::new();
        mock.register(Method::Delete, "/me/events/evt-1", Value::Null)
            .register_page("/me/drive/root/children", vec![json!({"id": "f1"})])
            .register_page("/me/drive/root/children", vec![json!({"id": "f2"})]);

        assert!(mock.responses().contains(Method::Delete, "/me/events/evt-1"));
        assert!(!mock.responses().contains(Method::Get, "/me/events/evt-1"));
        assert_eq!(mock.pages().remaining("/me/drive/root/children"), 2);

        let _ = mock
            .collect_records("/me/drive/root/children", None, None, None)
            .await
            .unwrap();

        assert_eq!(mock.pages().remaining("/me/drive/root/children"), 1);
    }

    #[tokio::test]
    async fn test_shared_client_is_usable_as_trait_object() {
        let mock = Arc::new(MockGraphClient::new());
        mock.register(Method::Get, "/me/drive", json!({"id": "drive-1"}));

        let client = mock.shared();
        let value = client
            .request(Method::Get, "/me/drive", None, RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(value["id"], "drive-1");
        assert_eq!(mock.calls().len(), 1);
    }
}
