//! Dispatcher runtime configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use super::parse::{env_duration_ms, env_parse};
use super::ConfigError;
use crate::executor::RetryPolicy;

/// Runtime configuration loaded from environment.
///
/// Counts are resolved and validated at construction time; the dispatcher
/// reads them as-is for its whole lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    pool_size: NonZeroUsize,
    /// How long a caller waits for an idle connection.
    pub acquire_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed sleep between attempts.
    pub retry_backoff: Duration,
    queue_capacity: NonZeroUsize,
    worker_count: NonZeroUsize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pool_size: NonZeroUsize::MIN,
            acquire_timeout: Duration::from_millis(10_000),
            max_retries: 5,
            retry_backoff: Duration::from_millis(5_000),
            queue_capacity: NonZeroUsize::new(128).unwrap_or(NonZeroUsize::MIN),
            worker_count: NonZeroUsize::MIN,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let pool_size = non_zero(
            "INGEST_POOL_SIZE",
            env_parse("INGEST_POOL_SIZE", defaults.pool_size.get())?,
        )?;
        let queue_capacity = non_zero(
            "INGEST_QUEUE_CAPACITY",
            env_parse("INGEST_QUEUE_CAPACITY", defaults.queue_capacity.get())?,
        )?;
        let worker_count = Self::parse_worker_count()?;

        Ok(Self {
            pool_size,
            acquire_timeout: env_duration_ms(
                "INGEST_ACQUIRE_TIMEOUT_MS",
                defaults.acquire_timeout,
            )?,
            max_retries: env_parse("INGEST_MAX_RETRIES", defaults.max_retries)?,
            retry_backoff: env_duration_ms("INGEST_RETRY_BACKOFF_MS", defaults.retry_backoff)?,
            queue_capacity,
            worker_count,
        })
    }

    fn parse_worker_count() -> Result<NonZeroUsize, ConfigError> {
        let workers: usize = env_parse("INGEST_WORKERS", 1)?;
        non_zero("INGEST_WORKERS", resolve_workers(workers))
    }

    /// Connections in the pool (pre-computed, never zero).
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size.get()
    }

    /// Task queue capacity (pre-computed, never zero).
    #[inline]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.get()
    }

    /// Worker threads (pre-computed, never zero).
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.worker_count.get()
    }

    /// Retry policy described by this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry_backoff, self.max_retries)
    }

    /// Zero is treated as one.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Zero is treated as one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Zero means one worker per CPU.
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count =
            NonZeroUsize::new(resolve_workers(workers)).unwrap_or(NonZeroUsize::MIN);
        self
    }
}

fn resolve_workers(workers: usize) -> usize {
    if workers == 0 {
        num_cpus::get()
    } else {
        workers
    }
}

fn non_zero(key: &str, value: usize) -> Result<NonZeroUsize, ConfigError> {
    NonZeroUsize::new(value).ok_or_else(|| ConfigError::Invalid {
        key: key.into(),
        message: "must be greater than zero".into(),
    })
}
