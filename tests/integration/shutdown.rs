//! Shutdown and drop behaviour.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use ingest_runtime::ErrorCode;

use crate::helpers::{config, forward, start, TABLE};

#[test]
fn test_queued_tasks_are_aborted_on_drop() {
    let (server, dispatcher) = start(config().with_queue_capacity(16));
    server.set_insert_delay(Duration::from_millis(100));

    let (tx, rx) = mpsc::channel();
    for i in 0..5u32 {
        dispatcher.insert_async(TABLE, Arc::new(i), None, forward(&tx));
    }
    thread::sleep(Duration::from_millis(30));
    drop(dispatcher);
    drop(tx);

    let results: Vec<_> = rx.iter().collect();
    assert_eq!(results.len(), 5);

    let aborted: Vec<_> = results
        .iter()
        .filter(|r| r.err_code == ErrorCode::ABORTED)
        .collect();
    assert_eq!(aborted.len(), 4);
    assert!(aborted[0].err_msg.contains("shut down"));
    // The in-flight insert finished normally.
    assert_eq!(server.batch_count(TABLE), 1);
}

#[test]
fn test_blocked_producer_released_by_shutdown() {
    let (_server, dispatcher) = start(config().with_queue_capacity(1));
    let dispatcher = Arc::new(dispatcher);

    // Park the worker, then fill the queue.
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();
    dispatcher.insert_async(TABLE, Arc::new(0), None, move |_| {
        started_tx.send(()).unwrap();
        let _ = gate_rx.recv();
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (tx, rx) = mpsc::channel();
    dispatcher.insert_async(TABLE, Arc::new(1), None, forward(&tx));

    let producer = {
        let dispatcher = Arc::clone(&dispatcher);
        let tx = tx.clone();
        thread::spawn(move || dispatcher.insert_async(TABLE, Arc::new(2), None, forward(&tx)))
    };
    thread::sleep(Duration::from_millis(50));

    let closer = {
        let dispatcher = Arc::clone(&dispatcher);
        thread::spawn(move || dispatcher.shutdown())
    };
    producer.join().unwrap();
    gate_tx.send(()).unwrap();
    closer.join().unwrap();
    drop(tx);

    let mut codes: Vec<_> = rx.iter().map(|r| (*r.batch, r.err_code)).collect();
    codes.sort_by_key(|(batch, _)| *batch);
    assert_eq!(
        codes,
        vec![(1, ErrorCode::ABORTED), (2, ErrorCode::ABORTED)]
    );
}

#[test]
fn test_shutdown_is_idempotent() {
    let (_server, dispatcher) = start(config().with_worker_count(3));
    dispatcher.shutdown();
    dispatcher.shutdown();
    assert!(dispatcher.is_shutdown());
    assert!(dispatcher.metrics().export().contains("ingest_workers_total 0"));
}
