//! Task dispatcher: bounded queue, worker threads and connection pool.
//!
//! Producers hand tasks to the queue; each worker takes one at a time, runs
//! it through the [`RetryExecutor`] against a pooled connection and fires the
//! task's callback with the terminal result. Workers are plain OS threads:
//! every operation here blocks.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::pool::{ConnectionPool, PoolError, PoolResult};
use super::queue::{BoundedQueue, PushError};
use super::retry::RetryExecutor;
use crate::config::RuntimeConfig;
use crate::connection::{BatchOf, Connection, ConnectionFactory};
use crate::core::{BaseResult, Error, InsertResult};
use crate::observability::Metrics;
use crate::types::{InsertTask, Task};

/// How long an idle worker waits on the queue before re-checking for shutdown.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Point-in-time counters for a [`Dispatcher`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Tasks waiting in the queue
    pub queued: usize,
    /// Idle pooled connections
    pub idle_connections: usize,
    /// Tasks accepted, sync calls included
    pub submitted: u64,
    /// Tasks that finished successfully
    pub completed: u64,
    /// Tasks that finished with an error, aborted ones included
    pub failed: u64,
    /// Retries across all tasks
    pub retries: u64,
}

struct Shared<F: ConnectionFactory> {
    tasks: BoundedQueue<Task<BatchOf<F>>>,
    pool: ConnectionPool<F>,
    retry: RetryExecutor,
    metrics: Arc<Metrics>,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl<F: ConnectionFactory> Shared<F> {
    fn new(factory: F, config: &RuntimeConfig, metrics: Arc<Metrics>) -> Self {
        let retry = RetryExecutor::new(config.retry_policy()).with_metrics(Arc::clone(&metrics));
        Self {
            tasks: BoundedQueue::new(config.queue_capacity()),
            pool: ConnectionPool::new(factory, config.pool_size(), config.acquire_timeout),
            retry,
            metrics,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn insert(&self, table: &str, batch: &BatchOf<F>, idempotent_id: Option<&str>) -> BaseResult {
        let res = self
            .retry
            .execute(&self.pool, |conn| conn.insert(table, batch, idempotent_id));

        if let Err(e) = &res {
            tracing::error!(
                table = %table,
                code = e.code().0,
                error = %e,
                "insert failed"
            );
        }
        BaseResult::from(res)
    }

    fn run(&self, task: Task<BatchOf<F>>) {
        tracing::debug!(
            kind = task.kind(),
            waited_ms = task.queued_at().elapsed().as_millis() as u64,
            "running task"
        );

        match task {
            Task::Insert(task) => {
                let result = self.insert(
                    &task.table_name,
                    &task.batch,
                    task.idempotent_id.as_deref(),
                );
                self.finish(task, result);
            }
        }
    }

    /// Record the outcome and fire the callback.
    fn finish(&self, task: InsertTask<BatchOf<F>>, result: BaseResult) {
        self.record(task.queued_at, result.ok());
        task.complete(result);
    }

    /// Fail a task that never ran.
    fn abort(&self, task: Task<BatchOf<F>>) {
        self.record(task.queued_at(), false);
        task.abort(&Error::Shutdown);
    }

    fn record(&self, started: Instant, success: bool) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics
            .record_completed(success, started.elapsed().as_secs_f64());
        self.update_gauges();
    }

    fn update_gauges(&self) {
        self.metrics
            .update_queue_metrics(self.tasks.len(), self.tasks.capacity());
        self.metrics
            .update_pool_metrics(self.pool.idle_count(), self.pool.size());
    }

    fn worker_loop(&self, id: usize) {
        tracing::debug!(worker = id, "worker started");

        loop {
            let task = self.tasks.take_timeout(WORKER_POLL_INTERVAL);

            // Closed queues still hand out leftovers; those are aborted, not run.
            if self.tasks.is_closed() {
                if let Some(task) = task {
                    self.guarded(id, || self.abort(task));
                }
                break;
            }

            if let Some(task) = task {
                self.guarded(id, || self.run(task));
            }
        }

        tracing::debug!(worker = id, "worker stopped");
    }

    /// A panicking callback must not take the worker down with it.
    fn guarded(&self, id: usize, f: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
            tracing::error!(worker = id, "task panicked");
        }
    }
}

/// Runs inserts on a fixed set of worker threads sharing one connection pool.
///
/// # Example
///
/// ```rust,ignore
/// use ingest_runtime::config::RuntimeConfig;
/// use ingest_runtime::executor::Dispatcher;
///
/// let dispatcher = Dispatcher::new(factory, &RuntimeConfig::default())?;
/// dispatcher.insert_async("events", Arc::new(batch), None, |result| {
///     if !result.ok() {
///         eprintln!("insert failed: {}", result.err_msg);
///     }
/// });
/// ```
pub struct Dispatcher<F: ConnectionFactory> {
    shared: Arc<Shared<F>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    name: String,
}

impl<F: ConnectionFactory> Dispatcher<F> {
    /// Create a dispatcher and start its workers.
    pub fn new(factory: F, config: &RuntimeConfig) -> PoolResult<Self> {
        Self::with_name(factory, config, "ingest-worker")
    }

    /// Create a dispatcher whose worker threads are named `{name}-{id}`.
    pub fn with_name(
        factory: F,
        config: &RuntimeConfig,
        name: impl Into<String>,
    ) -> PoolResult<Self> {
        let name = name.into();
        let metrics = Arc::new(Metrics::new()?);
        let shared = Arc::new(Shared::new(factory, config, metrics));

        let worker_count = config.worker_count();
        let mut workers = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let worker = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || worker.worker_loop(id));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Stop whatever already started before reporting.
                    shared.tasks.close();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(e.into());
                }
            }
        }

        shared.metrics.update_worker_metrics(worker_count);
        shared.update_gauges();

        tracing::info!(
            pool = %name,
            workers = worker_count,
            connections = config.pool_size(),
            capacity = config.queue_capacity(),
            "dispatcher started"
        );

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            worker_count,
            name,
        })
    }

    /// Insert `batch` on the calling thread and wait for the terminal result.
    pub fn insert(&self, table: &str, batch: &BatchOf<F>) -> BaseResult {
        self.insert_idempotent(table, batch, None)
    }

    /// Insert `batch` on the calling thread, tagging every attempt with
    /// `idempotent_id` so the server applies it at most once.
    pub fn insert_idempotent(
        &self,
        table: &str,
        batch: &BatchOf<F>,
        idempotent_id: Option<&str>,
    ) -> BaseResult {
        if self.shared.tasks.is_closed() {
            return BaseResult::from_error(&Error::Shutdown);
        }

        let started = Instant::now();
        self.mark_submitted();
        let idempotent_id = idempotent_id.filter(|id| !id.is_empty());
        let result = self.shared.insert(table, batch, idempotent_id);
        self.shared.record(started, result.ok());
        result
    }

    /// Queue an insert. Blocks while the queue is full.
    ///
    /// `callback` runs exactly once on a worker thread with the terminal
    /// result. If the dispatcher is shut down it runs right away on the
    /// calling thread with an `ABORTED` result.
    pub fn insert_async<C>(
        &self,
        table: impl Into<String>,
        batch: Arc<BatchOf<F>>,
        idempotent_id: Option<String>,
        callback: C,
    ) where
        C: FnOnce(InsertResult<BatchOf<F>>) + Send + 'static,
    {
        let task = InsertTask::new(table, batch, idempotent_id, callback);
        match self.shared.tasks.add(task.into()) {
            Ok(()) => self.accepted(),
            Err(e) => {
                tracing::debug!(pool = %self.name, "insert submitted after shutdown");
                self.mark_submitted();
                self.shared.abort(e.into_inner());
            }
        }
    }

    /// Queue an insert only if there is room right now.
    ///
    /// On failure nothing runs and the callback is dropped unexecuted; the
    /// caller still holds its batch and decides whether to resubmit.
    pub fn try_insert_async<C>(
        &self,
        table: impl Into<String>,
        batch: Arc<BatchOf<F>>,
        idempotent_id: Option<String>,
        callback: C,
    ) -> PoolResult<()>
    where
        C: FnOnce(InsertResult<BatchOf<F>>) + Send + 'static,
    {
        let task = InsertTask::new(table, batch, idempotent_id, callback);
        match self.shared.tasks.try_add(task.into()) {
            Ok(()) => {
                self.accepted();
                Ok(())
            }
            Err(PushError::Full(_)) => Err(PoolError::QueueFull {
                capacity: self.shared.tasks.capacity(),
                pending: self.shared.tasks.len(),
            }),
            Err(PushError::Closed(_)) => Err(PoolError::Shutdown),
        }
    }

    /// Queue an insert, waiting at most `timeout` for space.
    ///
    /// Like [`try_insert_async`], a task that is not queued is dropped with
    /// its callback unexecuted.
    ///
    /// [`try_insert_async`]: Dispatcher::try_insert_async
    pub fn insert_async_timeout<C>(
        &self,
        table: impl Into<String>,
        batch: Arc<BatchOf<F>>,
        idempotent_id: Option<String>,
        callback: C,
        timeout: Duration,
    ) -> PoolResult<()>
    where
        C: FnOnce(InsertResult<BatchOf<F>>) + Send + 'static,
    {
        let task = InsertTask::new(table, batch, idempotent_id, callback);
        match self.shared.tasks.add_timeout(task.into(), timeout) {
            Ok(()) => {
                self.accepted();
                Ok(())
            }
            Err(PushError::Full(_)) => {
                tracing::debug!(
                    pool = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "no queue space before timeout"
                );
                Err(PoolError::Timeout(timeout))
            }
            Err(PushError::Closed(_)) => Err(PoolError::Shutdown),
        }
    }

    /// Queue an insert and get its result through a channel, for async
    /// callers. Blocks while the queue is full, like [`insert_async`].
    ///
    /// [`insert_async`]: Dispatcher::insert_async
    pub fn insert_notify(
        &self,
        table: impl Into<String>,
        batch: Arc<BatchOf<F>>,
        idempotent_id: Option<String>,
    ) -> oneshot::Receiver<InsertResult<BatchOf<F>>> {
        let (tx, rx) = oneshot::channel();
        self.insert_async(table, batch, idempotent_id, move |result| {
            let _ = tx.send(result);
        });
        rx
    }

    /// Run a DDL statement on the calling thread, with retries.
    pub fn execute(&self, query: &str) -> BaseResult {
        if self.shared.tasks.is_closed() {
            return BaseResult::from_error(&Error::Shutdown);
        }

        let res = self
            .shared
            .retry
            .execute(&self.shared.pool, |conn| conn.execute(query));
        if let Err(e) = &res {
            tracing::error!(code = e.code().0, error = %e, "query failed");
        }
        BaseResult::from(res)
    }

    fn mark_submitted(&self) {
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.metrics.record_submitted();
    }

    fn accepted(&self) {
        self.mark_submitted();
        self.shared.update_gauges();
    }

    /// Snapshot of queue, pool and task counters.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            queued: self.shared.tasks.len(),
            idle_connections: self.shared.pool.idle_count(),
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            retries: self.shared.metrics.retries(),
        }
    }

    /// Prometheus metrics for this dispatcher.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.tasks.capacity()
    }

    /// Tasks waiting in the queue.
    pub fn pending_count(&self) -> usize {
        self.shared.tasks.len()
    }

    pub fn pool(&self) -> &ConnectionPool<F> {
        &self.shared.pool
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.tasks.is_closed()
    }

    /// Stop the workers and fail every task still queued.
    ///
    /// Tasks already taken by a worker run to completion first. Idempotent.
    pub fn shutdown(&self) {
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        if workers.is_empty() && self.shared.tasks.is_closed() {
            return;
        }

        tracing::info!(pool = %self.name, "shutting down dispatcher");
        self.shared.tasks.close();

        for worker in workers {
            if worker.join().is_err() {
                tracing::error!(pool = %self.name, "worker panicked");
            }
        }

        let leftover = self.shared.tasks.drain();
        if !leftover.is_empty() {
            tracing::warn!(
                pool = %self.name,
                tasks = leftover.len(),
                "aborting queued tasks"
            );
        }
        for task in leftover {
            self.shared.abort(task);
        }

        self.shared.metrics.update_worker_metrics(0);
        self.shared.update_gauges();
    }
}

impl<F: ConnectionFactory> Drop for Dispatcher<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
