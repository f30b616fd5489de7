//! Batched click counting.
//!
//! Redirects emit one click event each. Writing each one to the store would
//! put a write on every read, so events are queued, summed per short code in
//! memory, and handed to a [`ClickSink`] in batches by [`ClickAggregator`].
//! Delivery is at most once: a batch that fails to flush is reported and
//! dropped.

mod aggregator;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Error;
use crate::repository::LinkRepository;

pub use aggregator::ClickAggregator;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Aggregator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorOptions {
    /// Events that may wait in the ingestion queue before new ones are dropped.
    pub queue_capacity: usize,
    /// Pending increments that trigger an early flush.
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Deadline for a single call to the sink.
    pub flush_timeout: Duration,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

/// Destination for flushed click counts.
#[async_trait]
pub trait ClickSink: Send + Sync {
    /// Apply a batch of per-code click deltas.
    async fn flush_clicks(&self, counts: &HashMap<String, u64>) -> Result<(), Error>;
}

/// Flushes click batches into a [`LinkRepository`].
pub struct RepositorySink<R: ?Sized> {
    repo: Arc<R>,
}

impl<R: LinkRepository + ?Sized> RepositorySink<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: LinkRepository + ?Sized> ClickSink for RepositorySink<R> {
    async fn flush_clicks(&self, counts: &HashMap<String, u64>) -> Result<(), Error> {
        let updated = self.repo.batch_increment_clicks(counts).await?;
        if (updated as usize) < counts.len() {
            tracing::debug!("{} of {} clicked codes no longer exist", counts.len() - updated as usize, counts.len());
        }
        Ok(())
    }
}
