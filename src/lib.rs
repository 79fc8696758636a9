//! ingest_runtime - concurrent dispatch-and-retry runtime for batch ingestion.
//!
//! Producers submit column batches; a fixed set of worker threads sends them
//! to the server over a bounded pool of connections, classifying failures and
//! retrying the transient ones. Every submitted task gets exactly one result.
//!
//! # Features
//!
//! - **Backpressure**: a bounded task queue blocks producers when full
//! - **Connection pooling**: lazily opened connections with validity tracking
//! - **Retries**: fixed backoff, error taxonomy decides what is retriable
//! - **Idempotent resend**: ids forwarded so the server applies a batch once
//! - **Observability**: structured JSON logging and Prometheus metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ingest_runtime::config::RuntimeConfig;
//! use ingest_runtime::connection::memory::{MemoryConnector, MemoryServer};
//! use ingest_runtime::executor::Dispatcher;
//!
//! let server = MemoryServer::<Vec<u64>>::new();
//! server.create_table("events");
//!
//! let dispatcher = Dispatcher::new(MemoryConnector::new(server), &RuntimeConfig::default())?;
//! dispatcher.insert_async("events", Arc::new(vec![1, 2, 3]), None, |result| {
//!     assert!(result.ok());
//! });
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (8 chars), empty when built outside a checkout
pub const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Full version string: "0.1.0 (abc12345)"
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_VERSION"), ")");

pub mod config;
pub mod connection;
pub mod core;
pub mod executor;
pub mod logging;
pub mod observability;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use core::{BaseResult, Error, ErrorCode, InsertResult};
pub use executor::{Dispatcher, Inserter};
