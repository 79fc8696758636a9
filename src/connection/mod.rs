//! Interface to the wire-protocol client.
//!
//! The runtime never speaks the protocol itself. It borrows connections built
//! by a [`ConnectionFactory`] and drives them through the [`Connection`]
//! trait; every method reports failures as a classified [`Error`] so the
//! retry executor can decide what to do.
//!
//! [`memory`] provides an in-process implementation used by tests and the
//! demo binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use ingest_runtime::connection::memory::{MemoryConnector, MemoryServer};
//!
//! let server = MemoryServer::<Vec<u64>>::new();
//! server.create_table("events");
//! let connector = MemoryConnector::new(server.clone());
//! ```

pub mod memory;

use crate::core::Result;

/// A session with the server. Owned by exactly one thread at a time.
pub trait Connection: Send + 'static {
    /// Column data sent by [`Connection::insert`].
    type Batch: Send + Sync + 'static;

    /// Insert a batch into `table`. A non-empty `idempotent_id` lets the
    /// server drop a duplicate resend of the same batch.
    fn insert(
        &mut self,
        table: &str,
        batch: &Self::Batch,
        idempotent_id: Option<&str>,
    ) -> Result<()>;

    /// Run a statement that returns no rows.
    fn execute(&mut self, query: &str) -> Result<()>;

    /// Cheap liveness probe.
    fn ping(&mut self) -> Result<()>;

    /// Re-establish the session, possibly against another endpoint.
    fn reset_endpoint(&mut self) -> Result<()>;
}

/// Opens new connections for the pool.
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    /// Open a connection. Failures should be [`crate::core::Error::Network`].
    fn connect(&self) -> Result<Self::Connection>;
}

/// Batch type accepted by connections of factory `F`.
pub type BatchOf<F> = <<F as ConnectionFactory>::Connection as Connection>::Batch;
