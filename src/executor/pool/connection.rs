//! Fixed-size connection pool.
//!
//! The pool owns exactly `size` slots. A slot is either idle in the queue or
//! held by one [`GuardedConnection`], never both and never neither. Each slot
//! carries an optional connection (opened lazily on first use) and a validity
//! flag: an invalid slot is reconnected by its next user before any request
//! goes out on it.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::connection::{Connection, ConnectionFactory};
use crate::core::{Error, Result};
use crate::executor::queue::BoundedQueue;

struct Slot<C> {
    conn: Option<C>,
    valid: bool,
}

/// Pool of `size` connections built by a [`ConnectionFactory`].
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    slots: BoundedQueue<Slot<F::Connection>>,
    size: usize,
    acquire_timeout: Duration,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool of `size` empty slots. No connection is opened yet.
    pub fn new(factory: F, size: usize, acquire_timeout: Duration) -> Self {
        let slots = BoundedQueue::new(size);
        for _ in 0..size {
            let _ = slots.try_add(Slot {
                conn: None,
                valid: false,
            });
        }

        Self {
            factory,
            slots,
            size,
            acquire_timeout,
        }
    }

    /// Borrow a connection, waiting up to the configured acquire timeout.
    pub fn acquire(&self) -> Result<GuardedConnection<'_, F>> {
        self.acquire_timeout(self.acquire_timeout)
    }

    /// Borrow a connection, waiting up to `timeout` for an idle slot.
    ///
    /// The slot's connection is opened on first use and reconnected if the
    /// previous holder left it invalid. If either fails the slot goes back
    /// to the pool marked invalid and a network error is returned.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<GuardedConnection<'_, F>> {
        let Slot { conn, valid } = self
            .slots
            .take_timeout(timeout)
            .ok_or(Error::PoolTimeout(timeout))?;

        let conn = match conn {
            None => match self.factory.connect() {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::debug!(error = %e, "failed to open connection");
                    self.release(None, false);
                    return Err(as_network(e));
                }
            },
            Some(mut conn) if !valid => {
                if let Err(e) = conn.reset_endpoint() {
                    tracing::debug!(error = %e, "failed to reconnect");
                    self.release(Some(conn), false);
                    return Err(as_network(e));
                }
                conn
            }
            Some(conn) => conn,
        };

        Ok(GuardedConnection {
            pool: self,
            conn: Some(conn),
            valid: true,
        })
    }

    fn release(&self, conn: Option<F::Connection>, valid: bool) {
        if self.slots.try_add(Slot { conn, valid }).is_err() {
            // Unreachable while the size invariant holds.
            tracing::error!(size = self.size, "connection released into a full pool");
        }
    }

    /// Total number of slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots currently idle. Stale as soon as it returns.
    pub fn idle_count(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently checked out. Stale as soon as it returns.
    pub fn in_use_count(&self) -> usize {
        self.size.saturating_sub(self.slots.len())
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("size", &self.size)
            .field("idle", &self.idle_count())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

fn as_network(err: Error) -> Error {
    match err {
        Error::Network(_) => err,
        other => Error::Network(other.to_string()),
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// Dropping the guard returns the connection to the pool tagged with the
/// guard's current validity, on every exit path.
pub struct GuardedConnection<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    // Some for the guard's whole life; only `Drop` takes it.
    conn: Option<F::Connection>,
    valid: bool,
}

impl<'a, F: ConnectionFactory> GuardedConnection<'a, F> {
    /// Validity the connection will be released with.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark the session unusable; the next holder reconnects.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Ping the connection and record whether it is still alive.
    pub fn mark_validated(&mut self) -> bool {
        self.valid = self.deref_mut().ping().is_ok();
        tracing::trace!(valid = self.valid, "tested connection");
        self.valid
    }

    /// Re-establish the session in place. Failures are reported as network
    /// errors and leave the guard invalid.
    pub fn reconnect(&mut self) -> Result<()> {
        let res = self.deref_mut().reset_endpoint();
        self.valid = res.is_ok();
        res.map_err(as_network)
    }

    /// Return the connection to the pool now.
    pub fn release(self) {}
}

impl<'a, F: ConnectionFactory> Deref for GuardedConnection<'a, F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection held until release")
    }
}

impl<'a, F: ConnectionFactory> DerefMut for GuardedConnection<'a, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection held until release")
    }
}

impl<'a, F: ConnectionFactory> fmt::Debug for GuardedConnection<'a, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedConnection")
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl<'a, F: ConnectionFactory> Drop for GuardedConnection<'a, F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(Some(conn), self.valid);
        }
    }
}
