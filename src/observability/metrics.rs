//! Prometheus metrics for ingest_runtime.
//!
//! Rate, errors and duration for inserts, plus queue and pool saturation.

use prometheus::core::Collector;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

/// Prometheus registry with all runtime metrics.
///
/// Each dispatcher owns its own registry, so several runtimes in one process
/// never collide on metric names.
pub struct Metrics {
    registry: Registry,

    // === Tasks ===
    /// Tasks accepted by the dispatcher
    pub tasks_submitted_total: Counter,

    /// Tasks that reached a terminal state, by status
    pub tasks_completed_total: CounterVec,

    /// Wall time from submission to terminal state, in seconds
    pub insert_duration_seconds: Histogram,

    // === Retry ===
    /// Operations sent on a connection, first attempts included
    pub attempts_total: Counter,

    /// Retries by error kind
    pub retries_total: CounterVec,

    // === Saturation ===
    /// Current task queue depth
    pub queue_depth: Gauge,

    /// Task queue capacity
    pub queue_capacity: Gauge,

    /// Idle pool connections
    pub pool_idle: Gauge,

    /// Pool size
    pub pool_size: Gauge,

    /// Worker threads
    pub workers_total: Gauge,
}

impl Metrics {
    /// Create a new registry with all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Insert latency buckets (in seconds). Retries with backoff push the
        // tail well past a second.
        let insert_buckets = vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ];

        let tasks_submitted_total = Counter::new(
            "ingest_tasks_submitted_total",
            "Total tasks accepted by the dispatcher",
        )?;
        registry.register(Box::new(tasks_submitted_total.clone()))?;

        let tasks_completed_total = CounterVec::new(
            Opts::new(
                "ingest_tasks_completed_total",
                "Total tasks that reached a terminal state",
            ),
            &["status"],
        )?;
        registry.register(Box::new(tasks_completed_total.clone()))?;

        let insert_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "ingest_insert_duration_seconds",
                "Insert duration from submission to completion in seconds",
            )
            .buckets(insert_buckets),
        )?;
        registry.register(Box::new(insert_duration_seconds.clone()))?;

        let attempts_total = Counter::new(
            "ingest_attempts_total",
            "Total operations sent on a pooled connection",
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        let retries_total = CounterVec::new(
            Opts::new("ingest_retries_total", "Total retries by error kind"),
            &["reason"],
        )?;
        registry.register(Box::new(retries_total.clone()))?;

        let queue_depth = Gauge::new("ingest_queue_depth", "Current task queue depth")?;
        registry.register(Box::new(queue_depth.clone()))?;

        let queue_capacity = Gauge::new("ingest_queue_capacity", "Task queue capacity")?;
        registry.register(Box::new(queue_capacity.clone()))?;

        let pool_idle = Gauge::new("ingest_pool_idle", "Idle pooled connections")?;
        registry.register(Box::new(pool_idle.clone()))?;

        let pool_size = Gauge::new("ingest_pool_size", "Connection pool size")?;
        registry.register(Box::new(pool_size.clone()))?;

        let workers_total = Gauge::new("ingest_workers_total", "Total number of workers")?;
        registry.register(Box::new(workers_total.clone()))?;

        Ok(Self {
            registry,
            tasks_submitted_total,
            tasks_completed_total,
            insert_duration_seconds,
            attempts_total,
            retries_total,
            queue_depth,
            queue_capacity,
            pool_idle,
            pool_size,
            workers_total,
        })
    }

    /// Record an accepted task.
    pub fn record_submitted(&self) {
        self.tasks_submitted_total.inc();
    }

    /// Record a task's terminal state.
    pub fn record_completed(&self, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.tasks_completed_total
            .with_label_values(&[status])
            .inc();
        self.insert_duration_seconds.observe(duration_secs);
    }

    /// Record one operation sent on a connection.
    pub fn record_attempt(&self) {
        self.attempts_total.inc();
    }

    /// Record a retry caused by an error of kind `reason`.
    pub fn record_retry(&self, reason: &str) {
        self.retries_total.with_label_values(&[reason]).inc();
    }

    /// Update queue metrics.
    pub fn update_queue_metrics(&self, depth: usize, capacity: usize) {
        self.queue_depth.set(depth as f64);
        self.queue_capacity.set(capacity as f64);
    }

    /// Update pool metrics.
    pub fn update_pool_metrics(&self, idle: usize, size: usize) {
        self.pool_idle.set(idle as f64);
        self.pool_size.set(size as f64);
    }

    /// Update worker metrics.
    pub fn update_worker_metrics(&self, total: usize) {
        self.workers_total.set(total as f64);
    }

    /// Total recorded retries across all reasons.
    pub fn retries(&self) -> u64 {
        self.retries_total
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Get the Prometheus registry (for custom metrics).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
