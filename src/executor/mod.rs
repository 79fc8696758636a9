//! Dispatch-and-retry runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  insert_async  ┌──────────────┐  take  ┌──────────┐
//! │ Producer │───────────────▶│ BoundedQueue │───────▶│  Worker  │──┐
//! └──────────┘  (blocks when  └──────────────┘        │  Thread  │  │
//!                 full)                               └──────────┘  │
//!                                                                   ▼
//!     callback(InsertResult) ◀── RetryExecutor ◀── ConnectionPool::acquire
//! ```
//!
//! The task queue and the connection pool each have their own lock, so
//! producers waiting for queue space never contend with workers waiting for
//! a connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use ingest_runtime::config::RuntimeConfig;
//! use ingest_runtime::executor::Dispatcher;
//!
//! let dispatcher = Dispatcher::new(factory, &RuntimeConfig::from_env()?)?;
//! let result = dispatcher.insert("events", &batch);
//! assert!(result.ok());
//! ```

mod dispatcher;
mod inserter;
pub mod pool;
pub mod queue;
pub mod retry;

pub use dispatcher::{Dispatcher, DispatcherStats};
pub use inserter::Inserter;
pub use pool::{ConnectionPool, GuardedConnection, PoolError, PoolResult};
pub use queue::{BoundedQueue, PushError};
pub use retry::{RetryExecutor, RetryPolicy};
