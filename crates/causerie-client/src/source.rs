//! Descriptor source: the messaging backend collaborator.
//!
//! The controller only needs three things from the backend: the latest page
//! of a conversation, the page before a given item, and a way to publish our
//! own typing signals. [`MemorySource`] serves a fixed history from memory,
//! for the replay tool and for tests.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use causerie_shared::{ConversationId, Descriptor, DescriptorId, SourceError, TypingAction};
use causerie_timeline::OrderKey;

/// Which page of history to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorFilter {
    /// Only descriptors ordered strictly before this (timestamp, id).
    pub before: Option<(i64, DescriptorId)>,
    pub limit: usize,
}

impl DescriptorFilter {
    pub fn latest(limit: usize) -> Self {
        Self { before: None, limit }
    }

    pub fn older_than(timestamp: i64, id: DescriptorId, limit: usize) -> Self {
        Self {
            before: Some((timestamp, id)),
            limit,
        }
    }

    fn admits(&self, descriptor: &Descriptor) -> bool {
        match &self.before {
            None => true,
            Some((timestamp, id)) => {
                OrderKey::new(descriptor.created_at, &descriptor.id) < OrderKey::new(*timestamp, id)
            }
        }
    }
}

pub trait DescriptorSource: Send + Sync + 'static {
    /// Most recent page of `conversation`, in any order.
    fn fetch_initial(
        &self,
        conversation: ConversationId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Descriptor>, SourceError>> + Send;

    /// Page of descriptors older than the filter's cursor.
    fn fetch_older(
        &self,
        conversation: ConversationId,
        filter: DescriptorFilter,
    ) -> impl Future<Output = Result<Vec<Descriptor>, SourceError>> + Send;

    /// Tell the peers we started or stopped typing.
    fn publish_typing(
        &self,
        conversation: ConversationId,
        action: TypingAction,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;
}

#[derive(Debug, Default)]
struct MemoryInner {
    history: Vec<Descriptor>,
    published: Vec<TypingAction>,
    fetches: usize,
    failures: usize,
}

/// In-memory source serving a fixed history.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<MemoryInner>>,
    latency: Duration,
}

impl MemorySource {
    pub fn new(history: Vec<Descriptor>) -> Self {
        let source = Self::default();
        if let Ok(mut inner) = source.inner.lock() {
            inner.history = history;
        }
        source
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next `count` fetches fail.
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failures = count;
        }
    }

    pub fn fetches(&self) -> usize {
        self.inner.lock().map(|i| i.fetches).unwrap_or_default()
    }

    pub fn published(&self) -> Vec<TypingAction> {
        self.inner.lock().map(|i| i.published.clone()).unwrap_or_default()
    }

    async fn page(&self, filter: DescriptorFilter) -> Result<Vec<Descriptor>, SourceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut inner = self
            .inner
            .lock()
            .map_err(|e| SourceError::Unavailable(format!("Lock poisoned: {e}")))?;
        inner.fetches += 1;
        if inner.failures > 0 {
            inner.failures -= 1;
            return Err(SourceError::Fetch("injected failure".to_string()));
        }

        let mut page: Vec<Descriptor> = inner
            .history
            .iter()
            .filter(|d| filter.admits(d))
            .cloned()
            .collect();
        page.sort_by_key(|d| OrderKey::new(d.created_at, &d.id));
        let skip = page.len().saturating_sub(filter.limit);
        debug!(total = page.len(), returned = page.len() - skip, "Serving history page");
        Ok(page.split_off(skip))
    }
}

impl DescriptorSource for MemorySource {
    async fn fetch_initial(
        &self,
        _conversation: ConversationId,
        limit: usize,
    ) -> Result<Vec<Descriptor>, SourceError> {
        self.page(DescriptorFilter::latest(limit)).await
    }

    async fn fetch_older(
        &self,
        _conversation: ConversationId,
        filter: DescriptorFilter,
    ) -> Result<Vec<Descriptor>, SourceError> {
        self.page(filter).await
    }

    async fn publish_typing(
        &self,
        _conversation: ConversationId,
        action: TypingAction,
    ) -> Result<(), SourceError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| SourceError::Unavailable(format!("Lock poisoned: {e}")))?;
        inner.published.push(action);
        Ok(())
    }
}
