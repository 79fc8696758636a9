//! Test helpers and utilities

use std::sync::mpsc;
use std::time::Duration;

use ingest_runtime::config::RuntimeConfig;
use ingest_runtime::connection::memory::{MemoryConnector, MemoryServer};
use ingest_runtime::{Dispatcher, InsertResult};

pub type TestDispatcher = Dispatcher<MemoryConnector<u32>>;

pub const TABLE: &str = "events";

/// Fast retries, short acquire timeout.
pub fn config() -> RuntimeConfig {
    RuntimeConfig::default()
        .with_acquire_timeout(Duration::from_millis(500))
        .with_retry_backoff(Duration::from_millis(1))
        .with_max_retries(3)
}

/// Server with `TABLE` created, and a dispatcher on top of it.
pub fn start(config: RuntimeConfig) -> (MemoryServer<u32>, TestDispatcher) {
    let server = MemoryServer::new();
    server.create_table(TABLE);
    let dispatcher = Dispatcher::new(MemoryConnector::new(server.clone()), &config)
        .expect("Failed to start dispatcher");
    (server, dispatcher)
}

/// Callback that forwards results to a channel.
pub fn forward(
    tx: &mpsc::Sender<InsertResult<u32>>,
) -> impl FnOnce(InsertResult<u32>) + Send + 'static {
    let tx = tx.clone();
    move |result| {
        let _ = tx.send(result);
    }
}

/// Wait for one result.
pub fn recv(rx: &mpsc::Receiver<InsertResult<u32>>) -> InsertResult<u32> {
    rx.recv_timeout(Duration::from_secs(10))
        .expect("callback did not fire")
}
