//! Connection pool and submission errors.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    ConnectionPool                          │
//! ├────────────────────────────────────────────────────────────┤
//! │   idle slots (BoundedQueue, capacity = pool size)          │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐        │
//! │  │ conn, valid  │ │ None, false  │ │ conn, false  │  ...   │
//! │  └──────┬───────┘ └──────────────┘ └──────────────┘        │
//! │         │ acquire()            ▲                           │
//! │         ▼                      │ drop / release()          │
//! │  ┌─────────────────────────────┴──┐                        │
//! │  │       GuardedConnection        │  (one worker)          │
//! │  └────────────────────────────────┘                        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Idle plus checked-out slots always equals the pool size.

mod connection;
mod error;

pub use connection::{ConnectionPool, GuardedConnection};
pub use error::{PoolError, PoolResult};
