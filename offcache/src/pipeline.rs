// Copyright 2026 offcache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Asynchronous eviction side effects.
//!
//! [`QueuingEvictionListener`] turns every eviction into a [`CacheTask`] on a bounded queue. Drain workers take
//! batches of up to `batch_size` tasks off the queue and hand them to a [`TaskSaver`], so slow persistence never
//! runs on the eviction path. A full queue blocks the evicting caller.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use flume::{RecvTimeoutError, SendTimeoutError};
use offcache_common::{
    error::{Error, Result},
    event::EvictionListener,
};
use parking_lot::Mutex;

/// An evicted entry waiting to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTask<K, V> {
    key: K,
    value: V,
}

impl<K, V> CacheTask<K, V> {
    /// Create a task.
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    /// Evicted key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Evicted value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consume the task and return the key and the value.
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

/// Persists batches of evicted entries.
pub trait TaskSaver<K, V>: Send + Sync + 'static {
    /// Save one batch. Tasks keep their queue order within the batch.
    fn save(&self, tasks: &[CacheTask<K, V>]) -> Result<()>;
}

impl<K, V, F> TaskSaver<K, V> for F
where
    F: Fn(&[CacheTask<K, V>]) -> Result<()> + Send + Sync + 'static,
{
    fn save(&self, tasks: &[CacheTask<K, V>]) -> Result<()> {
        self(tasks)
    }
}

/// How drain workers are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DrainStrategy {
    /// One drain worker. Batches are saved in queue order.
    Single,
    /// `concurrency` drain workers. Batches of different workers may be saved out of queue order.
    Pool {
        /// Count of drain workers.
        concurrency: usize,
    },
}

impl Default for DrainStrategy {
    fn default() -> Self {
        Self::Pool { concurrency: 3 }
    }
}

impl DrainStrategy {
    fn workers(&self) -> usize {
        match self {
            DrainStrategy::Single => 1,
            DrainStrategy::Pool { concurrency } => *concurrency,
        }
    }
}

/// Retry on save failure.
///
/// After `max_attempts` failed attempts the batch is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Attempts per batch, including the first one.
    pub max_attempts: usize,
    /// Wait between two attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// Options of a [`QueuingEvictionListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Upper bound of tasks per saved batch.
    pub batch_size: usize,
    /// Capacity of the task queue.
    pub queue_size: usize,
    /// Drain workers.
    pub strategy: DrainStrategy,
    /// Retry on save failure.
    pub retry: RetryPolicy,
    /// How long an idle worker or a blocked producer waits before checking the state again.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            queue_size: 10000,
            strategy: DrainStrategy::default(),
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Builder for [`QueuingEvictionListener`].
pub struct PipelineBuilder<K, V> {
    config: PipelineConfig,
    saver: Arc<dyn TaskSaver<K, V>>,
}

impl<K, V> PipelineBuilder<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a builder that saves batches with `saver`.
    pub fn new(saver: impl TaskSaver<K, V>) -> Self {
        Self {
            config: PipelineConfig::default(),
            saver: Arc::new(saver),
        }
    }

    /// Replace all options.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the upper bound of tasks per saved batch.
    ///
    /// Default: 1000.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set the capacity of the task queue.
    ///
    /// Default: 10000.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.config.queue_size = queue_size;
        self
    }

    /// Set the drain strategy.
    ///
    /// Default: a pool of 3 workers.
    pub fn with_strategy(mut self, strategy: DrainStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the retry policy.
    ///
    /// Default: one attempt, failed batches are dropped.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the poll interval.
    ///
    /// Default: 10ms.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    /// Validate the options and build the listener. Workers are not started.
    pub fn build(self) -> Result<QueuingEvictionListener<K, V>> {
        let config = self.config;
        if config.batch_size == 0 || config.queue_size == 0 {
            return Err(Error::config("batch size and queue size must be greater than 0")
                .with_context("batch_size", config.batch_size)
                .with_context("queue_size", config.queue_size));
        }
        if config.strategy.workers() == 0 {
            return Err(Error::config("drain concurrency must be greater than 0"));
        }
        if config.retry.max_attempts == 0 {
            return Err(Error::config("retry attempts must be greater than 0"));
        }
        if config.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be greater than 0"));
        }

        let (tx, rx) = flume::bounded(config.queue_size);
        let shared = Arc::new(Shared {
            rx,
            saver: self.saver,
            config,
            running: AtomicBool::new(false),
            statistics: Arc::default(),
        });
        Ok(QueuingEvictionListener {
            inner: Arc::new(PipelineInner {
                tx,
                shared,
                workers: Mutex::new(vec![]),
            }),
        })
    }
}

/// Counters of a [`QueuingEvictionListener`].
#[derive(Debug, Default)]
pub struct PipelineStatistics {
    enqueued: AtomicU64,
    saved: AtomicU64,
    dropped: AtomicU64,
    batches: AtomicU64,
    failures: AtomicU64,
}

impl PipelineStatistics {
    /// Tasks put on the queue.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Tasks saved successfully.
    pub fn saved(&self) -> u64 {
        self.saved.load(Ordering::Relaxed)
    }

    /// Tasks dropped after exhausting the retry policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Batches saved successfully.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Failed save attempts.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// State shared with the drain workers.
struct Shared<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    rx: flume::Receiver<CacheTask<K, V>>,
    saver: Arc<dyn TaskSaver<K, V>>,
    config: PipelineConfig,
    running: AtomicBool,
    statistics: Arc<PipelineStatistics>,
}

impl<K, V> Shared<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Take up to `batch_size` queued tasks without blocking.
    fn take(&self, first: Option<CacheTask<K, V>>) -> Vec<CacheTask<K, V>> {
        let mut batch = Vec::with_capacity(self.config.batch_size.min(self.rx.len() + 1));
        batch.extend(first);
        while batch.len() < self.config.batch_size {
            match self.rx.try_recv() {
                Ok(task) => batch.push(task),
                Err(_) => break,
            }
        }
        batch
    }

    fn save(&self, batch: Vec<CacheTask<K, V>>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.saver.save(&batch) {
                Ok(()) => {
                    self.statistics.batches.fetch_add(1, Ordering::Relaxed);
                    self.statistics.saved.fetch_add(batch.len() as u64, Ordering::Relaxed);
                    return Ok(batch.len());
                }
                Err(e) => {
                    self.statistics.failures.fetch_add(1, Ordering::Relaxed);
                    if attempt >= retry.max_attempts {
                        self.statistics.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
                        tracing::warn!(
                            "[pipeline]: drop {} tasks after {attempt} failed attempts: {e}",
                            batch.len()
                        );
                        return Err(e);
                    }
                    tracing::debug!("[pipeline]: save attempt {attempt} failed, retry: {e}");
                    if !retry.backoff.is_zero() {
                        std::thread::sleep(retry.backoff);
                    }
                }
            }
        }
    }

    fn run(&self, worker: usize) {
        tracing::debug!("[pipeline]: drain worker {worker} started");
        while self.running.load(Ordering::Acquire) {
            match self.rx.recv_timeout(self.config.poll_interval) {
                Ok(task) => {
                    let batch = self.take(Some(task));
                    // Failures are counted and logged by `save`.
                    let _ = self.save(batch);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("[pipeline]: drain worker {worker} stopped");
    }
}

struct PipelineInner<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    tx: flume::Sender<CacheTask<K, V>>,
    shared: Arc<Shared<K, V>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<K, V> PipelineInner<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("[pipeline]: drain worker panicked");
            }
        }
        // Flush what is left. Failed batches are dropped, so this terminates.
        loop {
            match self.shared.save(self.shared.take(None)) {
                Ok(0) => break,
                Ok(_) | Err(_) => {}
            }
        }
    }
}

impl<K, V> Drop for PipelineInner<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

/// An eviction listener that queues evicted entries and saves them in batches.
///
/// Clones share the same queue and workers.
pub struct QueuingEvictionListener<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    inner: Arc<PipelineInner<K, V>>,
}

impl<K, V> Clone for QueuingEvictionListener<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Debug for QueuingEvictionListener<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuingEvictionListener")
            .field("config", &self.inner.shared.config)
            .field("queued", &self.inner.tx.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl<K, V> QueuingEvictionListener<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a builder that saves batches with `saver`.
    pub fn builder(saver: impl TaskSaver<K, V>) -> PipelineBuilder<K, V> {
        PipelineBuilder::new(saver)
    }

    /// Spawn the drain workers. No-op if they are running.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.inner.workers.lock();
        if self.inner.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for worker in 0..self.inner.shared.config.strategy.workers() {
            let shared = self.inner.shared.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("offcache-drain-{worker}"))
                .spawn(move || shared.run(worker));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    drop(workers);
                    self.inner.stop();
                    return Err(Error::external(e));
                }
            }
        }
        tracing::info!(
            "[pipeline]: started {} drain workers",
            self.inner.shared.config.strategy.workers()
        );
        Ok(())
    }

    /// Stop and join the drain workers, then save the tasks left on the queue.
    pub fn stop(&self) {
        self.inner.stop();
        tracing::info!("[pipeline]: stopped");
    }

    /// Returns `true` if the drain workers are running.
    pub fn is_running(&self) -> bool {
        self.inner.shared.running.load(Ordering::Acquire)
    }

    /// Save one batch of up to `batch_size` queued tasks on the calling thread. Returns the count of saved tasks.
    pub fn drain(&self) -> Result<usize> {
        self.inner.shared.save(self.inner.shared.take(None))
    }

    /// Count of queued tasks.
    pub fn queued(&self) -> usize {
        self.inner.tx.len()
    }

    /// Listener options.
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.shared.config
    }

    /// Listener counters.
    pub fn statistics(&self) -> &Arc<PipelineStatistics> {
        &self.inner.shared.statistics
    }

    fn enqueue(&self, mut task: CacheTask<K, V>) {
        loop {
            match self.inner.tx.send_timeout(task, self.inner.shared.config.poll_interval) {
                Ok(()) => {
                    self.inner.shared.statistics.enqueued.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(SendTimeoutError::Timeout(t)) => {
                    task = t;
                    // Nobody drains a stopped pipeline, make room on the caller.
                    if !self.is_running() {
                        let _ = self.drain();
                    }
                }
                // Unreachable while `inner` holds the receiver.
                Err(SendTimeoutError::Disconnected(_)) => {
                    tracing::warn!("[pipeline]: queue disconnected, drop task");
                    return;
                }
            }
        }
    }
}

impl<K, V> EvictionListener<K, V> for QueuingEvictionListener<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn on_eviction(&self, key: K, value: V) {
        self.enqueue(CacheTask::new(key, value));
    }
}

/// Batch sizes and keys seen by a saver, for tests.
#[cfg(test)]
pub(crate) fn recording_saver<K, V>() -> (Arc<Mutex<Vec<Vec<K>>>>, impl TaskSaver<K, V>)
where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let batches: Arc<Mutex<Vec<Vec<K>>>> = Arc::default();
    let saver = {
        let batches = batches.clone();
        move |tasks: &[CacheTask<K, V>]| -> Result<()> {
            batches.lock().push(tasks.iter().map(|t| t.key().clone()).collect());
            Ok(())
        }
    };
    (batches, saver)
}
