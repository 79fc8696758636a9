//! Retry policy and executor.
//!
//! [`RetryExecutor::execute`] is the one place failure handling lives: the
//! dispatcher workers, the dispatcher's synchronous calls and [`Inserter`]
//! all run their operations through it.
//!
//! [`Inserter`]: crate::executor::Inserter

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::connection::ConnectionFactory;
use crate::core::{Error, Recovery};
use crate::executor::pool::{ConnectionPool, GuardedConnection};
use crate::observability::Metrics;

/// How many times to resend, and how long to wait in between.
///
/// # Example
///
/// ```
/// use ingest_runtime::executor::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::fixed(Duration::from_millis(100), 3);
/// assert_eq!(policy.max_attempts(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Sleep between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5), 5)
    }
}

impl RetryPolicy {
    /// Fixed backoff between attempts.
    pub fn fixed(backoff: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Single attempt, never retry.
    pub fn no_retry() -> Self {
        Self::fixed(Duration::ZERO, 0)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Total attempts, including the first.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Check if there are attempts left after `attempt` (1-based).
    #[inline]
    pub fn has_attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Delay before attempt `attempt` (1-based). The first attempt runs
    /// immediately.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.backoff
        }
    }
}

/// Runs operations against pooled connections under a [`RetryPolicy`].
#[derive(Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            metrics: None,
        }
    }

    /// Record attempts and retries in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` on a connection from `pool` until it succeeds, fails
    /// fatally, or the attempts run out.
    ///
    /// The connection is held from the first successful acquire until the
    /// call returns, backoff sleeps included, so retries run in place. A
    /// session left invalid by a failed attempt is re-established before the
    /// next one. When attempts run out the last classified error is returned;
    /// a pool timeout never hides an earlier failure.
    pub fn execute<F, Op>(&self, pool: &ConnectionPool<F>, mut operation: Op) -> Result<(), Error>
    where
        F: ConnectionFactory,
        Op: FnMut(&mut F::Connection) -> Result<(), Error>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut held: Option<GuardedConnection<'_, F>> = None;
        let mut classified: Option<Error> = None;
        let mut attempt = 1;

        loop {
            let err = match self.attempt(pool, &mut held, &mut operation) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if !err.recovery().is_retry() {
                tracing::debug!(attempt, error = %err, "operation failed, not retriable");
                return Err(err);
            }

            if !self.policy.has_attempts_remaining(attempt) {
                let err = last_classified(err, classified);
                tracing::warn!(
                    attempts = attempt,
                    error = %err,
                    "operation failed, retries exhausted"
                );
                return Err(err);
            }

            tracing::warn!(
                attempt,
                max_attempts,
                code = err.code().0,
                error = %err,
                "operation failed, retrying"
            );
            if let Some(m) = &self.metrics {
                m.record_retry(err.kind());
            }

            if !matches!(err, Error::PoolTimeout(_)) {
                classified = Some(err);
            }

            attempt += 1;
            let delay = self.policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    /// One attempt: make sure a usable connection is held, then run
    /// `operation` on it and tag the connection with what the failure says.
    fn attempt<'p, F, Op>(
        &self,
        pool: &'p ConnectionPool<F>,
        held: &mut Option<GuardedConnection<'p, F>>,
        operation: &mut Op,
    ) -> Result<(), Error>
    where
        F: ConnectionFactory,
        Op: FnMut(&mut F::Connection) -> Result<(), Error>,
    {
        let conn = match held.take() {
            Some(conn) => conn,
            None => pool.acquire()?,
        };
        let conn = held.insert(conn);

        if !conn.is_valid() {
            tracing::debug!("re-establishing session before retry");
            conn.reconnect()?;
        }

        if let Some(m) = &self.metrics {
            m.record_attempt();
        }

        let err = match operation(&mut **conn) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        match err.recovery() {
            Recovery::ProbeAndRetry | Recovery::ProbeAndFail => {
                conn.mark_validated();
            }
            Recovery::InvalidateAndRetry => conn.invalidate(),
            Recovery::Retry | Recovery::Fail => {}
        }
        Err(err)
    }
}

/// Error to report once attempts run out.
fn last_classified(err: Error, classified: Option<Error>) -> Error {
    match (err, classified) {
        (Error::PoolTimeout(_), Some(prev)) => prev,
        (err, _) => err,
    }
}
