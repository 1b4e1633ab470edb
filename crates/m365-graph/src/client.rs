//! The [`GraphClient`] trait and its typed helpers.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Method, Result};

/// One record of a paginated Graph listing (a message, an event, a drive
/// item, ...).
pub type Record = Value;

/// Query string parameters, kept sorted so requests are reproducible.
pub type QueryParams = BTreeMap<String, String>;

/// Lazy, finite, single-use stream of records produced by a paginated
/// request.
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Graph client shared between the components that issue requests.
pub type SharedGraphClient = Arc<dyn GraphClient>;

/// Extra parameters of a single request.
///
/// Networked clients turn these into the HTTP request; in-memory clients
/// accept and ignore them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// JSON request body.
    pub json: Option<Value>,
    /// Raw request body, used for uploads.
    pub body: Option<Bytes>,
    /// Query string parameters.
    pub params: QueryParams,
    /// Additional request headers (e.g. `ConsistencyLevel`).
    pub headers: BTreeMap<String, String>,
}

impl RequestOptions {
    #[must_use]
    pub fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Request layer used by everything that reads or writes Microsoft 365 data.
///
/// Implementations must be thread-safe so a single client can be shared
/// behind an [`Arc`] by every caller of a bridge process.
///
/// # Required Methods
///
/// - [`Self::request`]: one request identified by verb and resource path
/// - [`Self::request_paginated`]: a listing that may span several pages
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Issues a single request and returns the decoded JSON payload.
    ///
    /// Responses without a body are returned as [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be served or Graph reports a
    /// failure status.
    async fn request(
        &self,
        method: Method,
        path: &str,
        account_id: Option<&str>,
        options: RequestOptions,
    ) -> Result<Value>;

    /// Starts a paginated listing of `path`.
    ///
    /// `limit` caps the number of records a networked client fetches; callers
    /// that need a hard cap should use [`GraphClientExt::collect_records`].
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be started. Running out of
    /// pages is not an error: the stream simply ends.
    async fn request_paginated(
        &self,
        path: &str,
        account_id: Option<&str>,
        params: Option<&QueryParams>,
        limit: Option<usize>,
    ) -> Result<RecordStream>;
}

/// Typed helpers available on every [`GraphClient`].
#[async_trait]
pub trait GraphClientExt: GraphClient {
    /// Sends a GET request and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the payload does not decode
    /// into `T`.
    async fn get_json<T>(&self, path: &str, account_id: Option<&str>) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        let value = self
            .request(Method::Get, path, account_id, RequestOptions::default())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a POST request with a JSON body and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized, the request fails,
    /// or the payload does not decode into `R`.
    async fn post_json<B, R>(&self, path: &str, account_id: Option<&str>, body: &B) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        let options = RequestOptions::default().with_json(serde_json::to_value(body)?);
        let value = self.request(Method::Post, path, account_id, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a PATCH request with a JSON body and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized, the request fails,
    /// or the payload does not decode into `R`.
    async fn patch_json<B, R>(&self, path: &str, account_id: Option<&str>, body: &B) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        let options = RequestOptions::default().with_json(serde_json::to_value(body)?);
        let value = self
            .request(Method::Patch, path, account_id, options)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a DELETE request, discarding any response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn delete(&self, path: &str, account_id: Option<&str>) -> Result<()> {
        self.request(Method::Delete, path, account_id, RequestOptions::default())
            .await?;
        Ok(())
    }

    /// Drains a paginated listing into a vector, stopping after `limit`
    /// records when one is given.
    ///
    /// # Errors
    ///
    /// Returns the first error produced while starting or reading the
    /// listing.
    async fn collect_records(
        &self,
        path: &str,
        account_id: Option<&str>,
        params: Option<&QueryParams>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        let mut stream = self
            .request_paginated(path, account_id, params, limit)
            .await?;
        let mut records = Vec::new();
        while limit.is_none_or(|max| records.len() < max) {
            match stream.next().await {
                Some(record) => records.push(record?),
                None => break,
            }
        }
        tracing::debug!(path, count = records.len(), "collected paginated records");
        Ok(records)
    }
}

impl<C: GraphClient + ?Sized> GraphClientExt for C {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_options_builders_accumulate() {
        let options = RequestOptions::default()
            .with_json(json!({"subject": "hi"}))
            .with_param("$top", "10")
            .with_param("$select", "id")
            .with_header("ConsistencyLevel", "eventual")
            .with_body(b"hello".to_vec());

        assert_eq!(options.json, Some(json!({"subject": "hi"})));
        assert_eq!(options.params.len(), 2);
        assert_eq!(options.params["$top"], "10");
        assert_eq!(options.headers["ConsistencyLevel"], "eventual");
        assert_eq!(options.body.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_request_options_default_is_empty() {
        let options = RequestOptions::default();
        assert!(options.json.is_none());
        assert!(options.body.is_none());
        assert!(options.params.is_empty());
        assert!(options.headers.is_empty());
    }
}
