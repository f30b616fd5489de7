//! In-process doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::Error;
use crate::cache::RemoteCache;
use crate::clicks::ClickSink;
use crate::observe::Observer;
use crate::record::{NewLink, ShortLinkRecord};
use crate::repository::LinkRepository;
use crate::router::Partition;

/// Partition backed by a hash map that can be switched off.
#[derive(Default)]
pub(crate) struct FakePartition {
    records: Mutex<HashMap<String, ShortLinkRecord>>,
    next_id: AtomicI64,
    down: AtomicBool,
    close_calls: Arc<AtomicUsize>,
    id_lookups: AtomicUsize,
}

impl FakePartition {
    /// A partition whose closes are counted on a shared counter.
    pub(crate) fn sharing_close_count(counter: Arc<AtomicUsize>) -> Self {
        Self { close_calls: counter, ..Default::default() }
    }

    /// While down, every call fails with a transient error.
    pub(crate) fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn id_lookups(&self) -> usize {
        self.id_lookups.load(Ordering::SeqCst)
    }

    /// Insert a record whose expiry has already passed.
    pub(crate) fn insert_expired(&self, code: &str) {
        let now = Utc::now();
        let record = ShortLinkRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            short_code: code.to_string(),
            target_url: "https://example.com".to_string(),
            created_at: now - chrono::Duration::hours(2),
            expires_at: Some(now - chrono::Duration::hours(1)),
            click_count: 0,
        };
        self.records.lock().insert(code.to_string(), record);
    }

    fn check(&self) -> Result<(), Error> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::Timeout("partition unavailable".into()));
        }
        Ok(())
    }

    fn live(&self, code: &str) -> Option<ShortLinkRecord> {
        let now = Utc::now();
        self.records.lock().get(code).filter(|r| !r.is_expired_at(now)).cloned()
    }
}

#[async_trait]
impl LinkRepository for FakePartition {
    async fn create(&self, link: NewLink) -> Result<ShortLinkRecord, Error> {
        self.check()?;
        link.validate()?;
        let mut records = self.records.lock();
        if records.contains_key(&link.short_code) {
            return Err(Error::AlreadyExists(link.short_code));
        }
        let record = ShortLinkRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            short_code: link.short_code.clone(),
            target_url: link.target_url,
            created_at: Utc::now(),
            expires_at: link.expires_at,
            click_count: 0,
        };
        records.insert(link.short_code, record.clone());
        Ok(record)
    }

    async fn get_by_code(&self, code: &str) -> Result<ShortLinkRecord, Error> {
        self.check()?;
        self.live(code).ok_or_else(|| Error::NotFound(code.to_string()))
    }

    async fn get_by_id(&self, id: i64) -> Result<ShortLinkRecord, Error> {
        self.id_lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let now = Utc::now();
        self.records
            .lock()
            .values()
            .find(|r| r.id == id && !r.is_expired_at(now))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("id {id}")))
    }

    async fn delete(&self, code: &str) -> Result<(), Error> {
        self.check()?;
        match self.records.lock().remove(code) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(code.to_string())),
        }
    }

    async fn increment_clicks(&self, code: &str) -> Result<(), Error> {
        self.check()?;
        match self.records.lock().get_mut(code) {
            Some(record) => {
                record.click_count += 1;
                Ok(())
            }
            None => Err(Error::NotFound(code.to_string())),
        }
    }

    async fn batch_increment_clicks(&self, counts: &HashMap<String, u64>) -> Result<u64, Error> {
        self.check()?;
        let mut records = self.records.lock();
        let mut updated = 0;
        for (code, n) in counts {
            if let Some(record) = records.get_mut(code) {
                record.click_count += *n as i64;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_expired(&self) -> Result<u64, Error> {
        self.check()?;
        let now = Utc::now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| !r.is_expired_at(now));
        Ok((before - records.len()) as u64)
    }

    async fn exists(&self, code: &str) -> Result<bool, Error> {
        self.check()?;
        Ok(self.live(code).is_some())
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.check()
    }
}

#[async_trait]
impl Partition for FakePartition {
    async fn ping(&self) -> Result<(), Error> {
        self.check()
    }

    async fn close(&self) -> Result<(), Error> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Remote cache where every call fails.
pub(crate) struct FailingCache;

#[async_trait]
impl RemoteCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Error> {
        Err(Error::Cache("cache unavailable".into()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), Error> {
        Err(Error::Cache("cache unavailable".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), Error> {
        Err(Error::Cache("cache unavailable".into()))
    }

    async fn exists(&self, _key: &str) -> Result<bool, Error> {
        Err(Error::Cache("cache unavailable".into()))
    }

    async fn ping(&self) -> Result<(), Error> {
        Err(Error::Cache("cache unavailable".into()))
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Observer that remembers which sites reported.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    sites: Mutex<Vec<&'static str>>,
}

impl RecordingObserver {
    pub(crate) fn sites(&self) -> Vec<&'static str> {
        self.sites.lock().clone()
    }
}

impl Observer for RecordingObserver {
    fn report(&self, site: &'static str, _err: &Error) {
        self.sites.lock().push(site);
    }
}

/// Sink that keeps every batch it receives.
#[derive(Default)]
pub(crate) struct RecordingSink {
    batches: Mutex<Vec<HashMap<String, u64>>>,
}

impl RecordingSink {
    pub(crate) fn batches(&self) -> usize {
        self.batches.lock().len()
    }

    /// Sum of flushed clicks for `code` across all batches.
    pub(crate) fn total(&self, code: &str) -> u64 {
        self.batches.lock().iter().filter_map(|b| b.get(code)).sum()
    }
}

#[async_trait]
impl ClickSink for RecordingSink {
    async fn flush_clicks(&self, counts: &HashMap<String, u64>) -> Result<(), Error> {
        self.batches.lock().push(counts.clone());
        Ok(())
    }
}

/// Sink that takes `delay` to answer.
pub(crate) struct SlowSink {
    delay: Duration,
}

impl SlowSink {
    pub(crate) fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ClickSink for SlowSink {
    async fn flush_clicks(&self, _counts: &HashMap<String, u64>) -> Result<(), Error> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Sink that always fails and counts attempts.
#[derive(Default)]
pub(crate) struct FailingSink {
    calls: AtomicUsize,
}

impl FailingSink {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClickSink for FailingSink {
    async fn flush_clicks(&self, _counts: &HashMap<String, u64>) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Timeout("sink unavailable".into()))
    }
}
