//! Background click aggregation task.
//!
//! Producers push short codes onto a bounded channel with `try_send` and
//! never wait. A single background task owns the receiving end, folds events
//! into the accumulator, and flushes when the interval fires, when the
//! pending total reaches the batch size, or when stopping. A flush swaps the
//! accumulator out under the lock and calls the sink after releasing it.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{AggregatorOptions, ClickSink};
use crate::Error;
use crate::observe::{Observer, TracingObserver, sites};

#[derive(Debug, Default)]
struct Accumulator {
    counts: HashMap<String, u64>,
    pending: u64,
}

/// State shared between the handle and the background task.
struct Shared {
    accumulator: Mutex<Accumulator>,
    accepting: AtomicBool,
    dropped: AtomicU64,
    flushed_batches: AtomicU64,
    failed_flushes: AtomicU64,
}

impl Shared {
    /// Count one click, returning the new pending total.
    fn add(&self, code: String) -> u64 {
        let mut acc = self.accumulator.lock();
        *acc.counts.entry(code).or_insert(0) += 1;
        acc.pending += 1;
        acc.pending
    }

    fn take(&self) -> HashMap<String, u64> {
        let mut acc = self.accumulator.lock();
        acc.pending = 0;
        mem::take(&mut acc.counts)
    }
}

/// Handle to a running click aggregation pipeline.
pub struct ClickAggregator {
    tx: mpsc::Sender<String>,
    shared: Arc<Shared>,
    stop: Arc<Notify>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ClickAggregator {
    /// Spawn the background task, reporting flush failures through `tracing`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(sink: Arc<dyn ClickSink>, options: AggregatorOptions) -> Self {
        Self::start_with_observer(sink, options, Arc::new(TracingObserver))
    }

    pub fn start_with_observer(
        sink: Arc<dyn ClickSink>, options: AggregatorOptions, observer: Arc<dyn Observer>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            accumulator: Mutex::new(Accumulator::default()),
            accepting: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
            flushed_batches: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
        });
        let stop = Arc::new(Notify::new());

        let worker = Worker { rx, shared: shared.clone(), sink, observer, options, stop: stop.clone() };
        let task = tokio::spawn(worker.run());

        Self { tx, shared, stop, task: tokio::sync::Mutex::new(Some(task)) }
    }

    /// Queue one click for `code`. Never blocks; drops the event when the
    /// queue is full or the aggregator is stopping.
    pub fn record_click(&self, code: &str) {
        if !self.shared.accepting.load(Ordering::Acquire) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if self.tx.try_send(code.to_string()).is_err() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy of the counts accumulated since the last flush.
    ///
    /// Events still waiting in the queue are not included.
    pub fn pending_snapshot(&self) -> HashMap<String, u64> {
        self.shared.accumulator.lock().counts.clone()
    }

    /// Events dropped because the queue was full or the aggregator stopped.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn flushed_batches(&self) -> u64 {
        self.shared.flushed_batches.load(Ordering::Relaxed)
    }

    pub fn failed_flushes(&self) -> u64 {
        self.shared.failed_flushes.load(Ordering::Relaxed)
    }

    /// Stop accepting clicks, drain the queue, and run a final flush.
    ///
    /// Returns once the background task has finished. Later calls return
    /// immediately. A failed final flush is reported, not returned.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            return;
        };

        self.shared.accepting.store(false, Ordering::Release);
        self.stop.notify_one();
        if let Err(e) = handle.await {
            tracing::error!("click aggregator task failed: {}", e);
        }
    }
}

struct Worker {
    rx: mpsc::Receiver<String>,
    shared: Arc<Shared>,
    sink: Arc<dyn ClickSink>,
    observer: Arc<dyn Observer>,
    options: AggregatorOptions,
    stop: Arc<Notify>,
}

impl Worker {
    async fn run(mut self) {
        let period = self.options.flush_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let batch_size = self.options.batch_size.max(1) as u64;

        loop {
            tokio::select! {
                biased;
                _ = self.stop.notified() => break,
                event = self.rx.recv() => match event {
                    Some(code) => {
                        if self.shared.add(code) >= batch_size {
                            self.flush().await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
            }
        }

        // Drain what was queued before the stop, then flush once more.
        self.rx.close();
        let mut drained = 0usize;
        while let Ok(code) = self.rx.try_recv() {
            self.shared.add(code);
            drained += 1;
        }
        tracing::debug!("click aggregator stopping, drained {} queued events", drained);
        self.flush().await;
    }

    async fn flush(&self) {
        let counts = self.shared.take();
        if counts.is_empty() {
            return;
        }

        let timeout = self.options.flush_timeout;
        let result = match tokio::time::timeout(timeout, self.sink.flush_clicks(&counts)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!("click flush exceeded {}ms", timeout.as_millis()))),
        };

        match result {
            Ok(()) => {
                self.shared.flushed_batches.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("flushed clicks for {} codes", counts.len());
            }
            Err(e) => {
                self.shared.failed_flushes.fetch_add(1, Ordering::Relaxed);
                self.observer.report(sites::CLICK_FLUSH, &e);
            }
        }
    }
}
