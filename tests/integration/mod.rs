//! Integration tests for ingest_runtime
//!
//! Every test drives a real `Dispatcher` against an in-process
//! `MemoryServer`, so no external services are needed.
//!
//! Run with: cargo test --test integration

mod helpers;

mod backpressure;
mod delivery;
mod pool;
mod shutdown;
