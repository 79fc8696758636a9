//! Retry bound, fatal errors, idempotent resend and exactly-once callbacks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use ingest_runtime::connection::memory::Fault;
use ingest_runtime::{Error, ErrorCode};

use crate::helpers::{config, forward, recv, start, TABLE};

#[test]
fn test_always_retriable_failure_attempted_max_retries_plus_one() {
    let (server, dispatcher) = start(config().with_max_retries(3));
    for _ in 0..10 {
        server.push_insert_fault(Fault::Reject(Error::Protocol("garbled block".into())));
    }

    let (tx, rx) = mpsc::channel();
    dispatcher.insert_async(TABLE, Arc::new(1), None, forward(&tx));

    let result = recv(&rx);
    assert_eq!(result.err_code, ErrorCode::UNEXPECTED_PACKET_FROM_SERVER);
    assert_eq!(server.calls().inserts, 4);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(dispatcher.stats().retries, 3);
}

#[test]
fn test_missing_column_fails_after_one_attempt() {
    let (server, dispatcher) = start(config());
    server.push_insert_fault(Fault::Reject(Error::server(
        ErrorCode::NO_SUCH_COLUMN_IN_TABLE,
        "There is no column 'x' in table",
    )));

    let (tx, rx) = mpsc::channel();
    dispatcher.insert_async(TABLE, Arc::new(1), None, forward(&tx));

    let result = recv(&rx);
    assert_eq!(result.err_code, ErrorCode::NO_SUCH_COLUMN_IN_TABLE);
    assert!(result.err_msg.contains("no column"));
    assert_eq!(server.calls().inserts, 1);
    assert_eq!(server.batch_count(TABLE), 0);
}

#[test]
fn test_transient_server_error_then_success() {
    let (server, dispatcher) = start(config());
    for _ in 0..2 {
        server.push_insert_fault(Fault::Reject(Error::server(
            ErrorCode::TIMEOUT_EXCEEDED,
            "timeout exceeded",
        )));
    }

    let result = dispatcher.insert(TABLE, &9);
    assert!(result.ok());
    assert_eq!(result.err_code, ErrorCode::OK);
    assert_eq!(server.calls().inserts, 3);
    assert_eq!(server.batches(TABLE), vec![9]);
}

#[test]
fn test_lost_ack_resend_applied_once() {
    let (server, dispatcher) = start(config());
    server.push_insert_fault(Fault::LoseAck(Error::Network("connection reset".into())));

    let (tx, rx) = mpsc::channel();
    dispatcher.insert_async(TABLE, Arc::new(5), Some("batch-5".into()), forward(&tx));

    let result = recv(&rx);
    assert!(result.ok());
    assert_eq!(result.idempotent_id.as_deref(), Some("batch-5"));
    assert_eq!(server.attempts_for("batch-5"), 2);
    assert_eq!(server.batch_count(TABLE), 1);
}

#[test]
fn test_lost_ack_without_id_duplicates() {
    let (server, dispatcher) = start(config());
    server.push_insert_fault(Fault::LoseAck(Error::Network("connection reset".into())));

    assert!(dispatcher.insert(TABLE, &5).ok());
    assert_eq!(server.batch_count(TABLE), 2);
}

#[test]
fn test_every_callback_fires_exactly_once() {
    const TASKS: usize = 200;

    // Enough retries that no task can run out, whatever faults it draws.
    let (server, dispatcher) = start(
        config()
            .with_worker_count(4)
            .with_pool_size(2)
            .with_queue_capacity(8)
            .with_max_retries(25),
    );
    for n in 0..20 {
        let fault = if n % 2 == 0 {
            Fault::Reject(Error::Protocol("bad frame".into()))
        } else {
            Fault::LoseAck(Error::Network("reset".into()))
        };
        server.push_insert_fault(fault);
    }

    let calls: Arc<Vec<AtomicUsize>> = Arc::new((0..TASKS).map(|_| AtomicUsize::new(0)).collect());
    let (done_tx, done_rx) = mpsc::channel();

    for i in 0..TASKS {
        let calls = Arc::clone(&calls);
        let done = done_tx.clone();
        dispatcher.insert_async(TABLE, Arc::new(i as u32), Some(format!("id-{}", i)), move |r| {
            calls[*r.batch as usize].fetch_add(1, Ordering::SeqCst);
            let _ = done.send(r.ok());
        });
    }
    drop(done_tx);

    let outcomes: Vec<bool> = done_rx.iter().collect();
    assert_eq!(outcomes.len(), TASKS);
    assert!(calls.iter().all(|c| c.load(Ordering::SeqCst) == 1));

    // Resends after a lost ack never duplicate.
    assert!(outcomes.iter().all(|ok| *ok));
    assert_eq!(server.batch_count(TABLE), TASKS);

    let stats = dispatcher.stats();
    assert_eq!(stats.submitted, TASKS as u64);
    assert_eq!(stats.completed, TASKS as u64);
    assert_eq!(stats.retries, 20);
    assert_eq!(stats.idle_connections, 2);
}

#[test]
fn test_insert_notify_from_async_caller() {
    let (_server, dispatcher) = start(config());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let results = runtime.block_on(async {
        let pending: Vec<_> = (0..5u32)
            .map(|i| dispatcher.insert_notify(TABLE, Arc::new(i), None))
            .collect();
        let mut out = Vec::new();
        for rx in pending {
            out.push(rx.await.unwrap());
        }
        out
    });

    assert!(results.iter().all(|r| r.ok()));
    assert_eq!(
        results.iter().map(|r| *r.batch).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
}
