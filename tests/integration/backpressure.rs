//! Producer blocking on a full task queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use crate::helpers::{config, forward, recv, start, TABLE};

#[test]
fn test_second_producer_blocks_until_worker_dequeues() {
    let (_server, dispatcher) = start(config().with_queue_capacity(1).with_worker_count(1));
    let dispatcher = Arc::new(dispatcher);

    // Park the only worker inside a callback.
    let (started_tx, started_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    dispatcher.insert_async(TABLE, Arc::new(0), None, move |_| {
        started_tx.send(()).unwrap();
        let _ = gate_rx.recv();
    });
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("worker did not start");

    let (tx, rx) = mpsc::channel();

    // Producer 1 fills the single slot and returns at once.
    dispatcher.insert_async(TABLE, Arc::new(1), None, forward(&tx));
    assert_eq!(dispatcher.pending_count(), 1);

    // Producer 2 must wait for item 1 to leave the queue.
    let returned = Arc::new(AtomicBool::new(false));
    let producer = {
        let dispatcher = Arc::clone(&dispatcher);
        let returned = Arc::clone(&returned);
        let tx = tx.clone();
        thread::spawn(move || {
            dispatcher.insert_async(TABLE, Arc::new(2), None, forward(&tx));
            returned.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(150));
    assert!(!returned.load(Ordering::SeqCst));
    assert_eq!(dispatcher.pending_count(), 1);

    gate_tx.send(()).unwrap();
    producer.join().unwrap();
    assert!(returned.load(Ordering::SeqCst));

    let mut order = vec![*recv(&rx).batch, *recv(&rx).batch];
    order.sort();
    assert_eq!(order, vec![1, 2]);
}

#[test]
fn test_try_insert_async_never_blocks() {
    let (_server, dispatcher) = start(config().with_queue_capacity(2).with_worker_count(1));

    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();
    dispatcher.insert_async(TABLE, Arc::new(0), None, move |_| {
        started_tx.send(()).unwrap();
        let _ = gate_rx.recv();
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (tx, rx) = mpsc::channel();
    assert!(dispatcher
        .try_insert_async(TABLE, Arc::new(1), None, forward(&tx))
        .is_ok());
    assert!(dispatcher
        .try_insert_async(TABLE, Arc::new(2), None, forward(&tx))
        .is_ok());

    let err = dispatcher
        .try_insert_async(TABLE, Arc::new(3), None, forward(&tx))
        .unwrap_err();
    assert!(err.is_queue_full());
    assert!(err.to_string().contains("2/2"));

    gate_tx.send(()).unwrap();
    assert_eq!(*recv(&rx).batch, 1);
    assert_eq!(*recv(&rx).batch, 2);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_insert_async_timeout_gives_up_on_full_queue() {
    let (server, dispatcher) = start(config().with_queue_capacity(1).with_worker_count(1));

    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();
    dispatcher.insert_async(TABLE, Arc::new(0), None, move |_| {
        started_tx.send(()).unwrap();
        let _ = gate_rx.recv();
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (tx, rx) = mpsc::channel();
    dispatcher
        .insert_async_timeout(TABLE, Arc::new(1), None, forward(&tx), Duration::from_millis(10))
        .unwrap();

    let waited = Instant::now();
    let err = dispatcher
        .insert_async_timeout(TABLE, Arc::new(2), None, forward(&tx), Duration::from_millis(100))
        .unwrap_err();
    assert!(waited.elapsed() >= Duration::from_millis(100));
    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "submit timeout after 100ms");
    assert_eq!(dispatcher.pending_count(), 1);

    // Space frees up while the producer waits.
    let producer = {
        let tx = tx.clone();
        let dispatcher = &dispatcher;
        thread::scope(|scope| {
            let handle = scope.spawn(move || {
                dispatcher.insert_async_timeout(
                    TABLE,
                    Arc::new(3),
                    None,
                    forward(&tx),
                    Duration::from_secs(5),
                )
            });
            thread::sleep(Duration::from_millis(50));
            gate_tx.send(()).unwrap();
            handle.join().unwrap()
        })
    };
    assert!(producer.is_ok());

    assert_eq!(*recv(&rx).batch, 1);
    assert_eq!(*recv(&rx).batch, 3);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(server.batches(TABLE), vec![0, 1, 3]);
}
