//! Load generator for the dispatcher.
//!
//! Sends batches to an in-process server with a few scripted faults, then
//! resends whatever failed with the same idempotent ids. Configured from the
//! environment like the library (`INGEST_*`, `LOG_*`), plus:
//!
//! - `INGEST_DEMO_BATCHES`: batches to send (default 200)
//! - `INGEST_DEMO_ROWS`: rows per batch (default 100)
//! - `INGEST_DEMO_FAULT_EVERY`: inject a fault every N batches (default 50, 0 = none)
//! - `INGEST_DEMO_ROUNDS`: resend rounds for failed batches (default 3)
//!
//! Retries sleep `INGEST_RETRY_BACKOFF_MS` (5s by default); lower it for a
//! quick run.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use ingest_runtime::config::{env_parse, Config};
use ingest_runtime::connection::memory::{Fault, MemoryConnector, MemoryServer};
use ingest_runtime::core::ServerException;
use ingest_runtime::executor::{BoundedQueue, Dispatcher};
use ingest_runtime::{logging, Error, ErrorCode, InsertResult, VERSION};

type Batch = Vec<u64>;

const TABLE: &str = "demo_events";

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;
    logging::init(&config.logging)?;

    info!(version = VERSION, "starting ingest demo");
    config.log_summary();

    let batches: usize = env_parse("INGEST_DEMO_BATCHES", 200)?;
    let rows: u64 = env_parse("INGEST_DEMO_ROWS", 100)?;
    let fault_every: usize = env_parse("INGEST_DEMO_FAULT_EVERY", 50)?;
    let rounds: usize = env_parse("INGEST_DEMO_ROUNDS", 3)?;

    let server = MemoryServer::<Batch>::new();
    let dispatcher = Dispatcher::new(MemoryConnector::new(server.clone()), &config.runtime)?;

    let ddl = dispatcher.execute(&format!("CREATE STREAM IF NOT EXISTS {}", TABLE));
    if !ddl.ok() {
        return Err(format!("failed to create {}: {}", TABLE, ddl).into());
    }

    if fault_every > 0 {
        for n in 0..batches / fault_every {
            server.push_insert_fault(demo_fault(n));
        }
    }

    let started = Instant::now();
    let failures = Arc::new(BoundedQueue::new(batches.max(1)));
    let (done_tx, done_rx) = mpsc::channel();

    for i in 0..batches as u64 {
        let batch: Batch = (i * rows..(i + 1) * rows).collect();
        let id = uuid::Uuid::new_v4().to_string();
        let failures = Arc::clone(&failures);
        let done = done_tx.clone();

        dispatcher.insert_async(TABLE, Arc::new(batch), Some(id), move |result| {
            if !result.ok() {
                // Capacity covers every batch, so this never blocks.
                let _ = failures.add(result);
            }
            let _ = done.send(());
        });
    }
    drop(done_tx);
    let completed = done_rx.iter().take(batches).count();
    info!(completed, "first pass finished");

    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    for round in 1..=rounds {
        let failed = failures.drain();
        if failed.is_empty() {
            break;
        }
        warn!(round, batches = failed.len(), "resending failed batches");

        let pending: Vec<_> = failed
            .into_iter()
            .map(|r: InsertResult<Batch>| {
                dispatcher.insert_notify(r.table_name, r.batch, r.idempotent_id)
            })
            .collect();

        for result in runtime.block_on(futures_util::future::join_all(pending)) {
            match result {
                Ok(result) if !result.ok() => {
                    let _ = failures.add(result);
                }
                Ok(_) => {}
                Err(_) => warn!("result channel closed"),
            }
        }
    }

    let stats = dispatcher.stats();
    let lost = failures.len();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        submitted = stats.submitted,
        completed = stats.completed,
        failed = stats.failed,
        retries = stats.retries,
        stored_batches = server.batch_count(TABLE),
        lost,
        "demo finished"
    );

    println!("{}", dispatcher.metrics().export());
    dispatcher.shutdown();

    if lost > 0 {
        return Err(format!("{} batches could not be delivered", lost).into());
    }
    Ok(())
}

/// Cycle through the failure kinds the runtime handles.
fn demo_fault(n: usize) -> Fault {
    match n % 4 {
        0 => Fault::Reject(Error::Protocol("unexpected packet".into())),
        1 => Fault::Reject(Error::Server(ServerException::new(
            ErrorCode::TIMEOUT_EXCEEDED,
            "insert timed out",
        ))),
        2 => Fault::LoseAck(Error::Network("connection reset by peer".into())),
        _ => Fault::Reject(Error::server(
            ErrorCode::TYPE_MISMATCH,
            "cannot convert column",
        )),
    }
}
