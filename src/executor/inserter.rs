//! Synchronous single-connection inserter.

use std::time::Duration;

use super::pool::ConnectionPool;
use super::retry::{RetryExecutor, RetryPolicy};
use crate::config::RuntimeConfig;
use crate::connection::{BatchOf, Connection, ConnectionFactory};
use crate::core::BaseResult;

/// Blocking inserts over one connection, with the same retry handling as
/// [`Dispatcher`] but no queue and no worker threads.
///
/// Concurrent callers take turns on the single connection.
///
/// [`Dispatcher`]: crate::executor::Dispatcher
pub struct Inserter<F: ConnectionFactory> {
    pool: ConnectionPool<F>,
    retry: RetryExecutor,
}

impl<F: ConnectionFactory> Inserter<F> {
    pub fn new(factory: F, acquire_timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            pool: ConnectionPool::new(factory, 1, acquire_timeout),
            retry: RetryExecutor::new(policy),
        }
    }

    /// Build from the runtime config; pool size, queue and workers are ignored.
    pub fn from_config(factory: F, config: &RuntimeConfig) -> Self {
        Self::new(factory, config.acquire_timeout, config.retry_policy())
    }

    pub fn insert(&self, table: &str, batch: &BatchOf<F>) -> BaseResult {
        self.insert_idempotent(table, batch, None)
    }

    pub fn insert_idempotent(
        &self,
        table: &str,
        batch: &BatchOf<F>,
        idempotent_id: Option<&str>,
    ) -> BaseResult {
        let idempotent_id = idempotent_id.filter(|id| !id.is_empty());
        self.retry
            .execute(&self.pool, |conn| conn.insert(table, batch, idempotent_id))
            .into()
    }

    pub fn execute(&self, query: &str) -> BaseResult {
        self.retry
            .execute(&self.pool, |conn| conn.execute(query))
            .into()
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.retry.policy()
    }
}
