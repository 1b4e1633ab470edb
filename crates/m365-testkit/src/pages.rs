//! Queued pages for paginated listing requests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use m365_graph::{Record, RecordStream};

/// In-memory map from resource path to a FIFO of pages.
///
/// Every registration appends one page; every lookup pops the oldest page.
/// Unknown or exhausted paths yield an empty page.
#[derive(Debug, Default)]
pub struct PageQueueRegistry {
    queues: Mutex<HashMap<String, VecDeque<Vec<Record>>>>,
}

impl PageQueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a page of records to the queue for `path`.
    pub fn register(&self, path: impl Into<String>, page: Vec<Record>) {
        let mut queues = self
            .queues
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        queues.entry(path.into()).or_default().push_back(page);
    }

    /// Pops the oldest unconsumed page for `path`, or an empty page.
    pub fn pop(&self, path: &str) -> Vec<Record> {
        let mut queues = self
            .queues
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        queues
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default()
    }

    /// Pops the next page and wraps it in a single-use record stream.
    pub fn pop_stream(&self, path: &str) -> RecordStream {
        let page = self.pop(path);
        Box::pin(futures::stream::iter(page.into_iter().map(Ok)))
    }

    /// Number of pages still queued for `path`.
    pub fn remaining(&self, path: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .map_or(0, VecDeque::len)
    }
}
