//! Request-layer abstraction for Microsoft Graph clients.
//!
//! Code that talks to Microsoft Graph (accounts, mail, calendar, drive,
//! search) goes through two operations: a single request keyed by verb and
//! resource path, and a paginated listing keyed by resource path. This crate
//! defines those operations as the object-safe [`GraphClient`] trait so that
//! callers receive a [`SharedGraphClient`] by injection and tests can hand
//! them an in-memory implementation instead of a networked one.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use m365_graph::{GraphClientExt, Method, SharedGraphClient};
//!
//! async fn inbox_size(client: SharedGraphClient, account: &str) -> m365_graph::Result<usize> {
//!     let messages = client
//!         .collect_records("/me/messages", Some(account), None, Some(50))
//!         .await?;
//!     Ok(messages.len())
//! }
//! ```

mod client;
mod error;
mod method;

pub use client::{
    GraphClient, GraphClientExt, QueryParams, Record, RecordStream, RequestOptions,
    SharedGraphClient,
};
pub use error::{GraphError, Result};
pub use method::{Method, ParseMethodError};
