//! Observability: Prometheus metrics.
//!
//! Structured logging lives in [`crate::logging`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use ingest_runtime::observability::Metrics;
//!
//! let metrics = Metrics::new()?;
//! metrics.record_completed(true, 0.05);
//! println!("{}", metrics.export());
//! ```

pub mod metrics;

pub use metrics::Metrics;
