//! Connection sharing across callers.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ingest_runtime::connection::memory::Fault;
use ingest_runtime::{Error, ErrorCode};

use crate::helpers::{config, start, TABLE};

#[test]
fn test_pool_bounds_concurrent_sync_callers() {
    let (server, dispatcher) = start(config().with_pool_size(2));
    server.set_insert_delay(Duration::from_millis(100));
    let dispatcher = Arc::new(dispatcher);
    let started = Instant::now();

    let handles: Vec<_> = (0..3u32)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || {
                let result = dispatcher.insert(TABLE, &i);
                (result, started.elapsed())
            })
        })
        .collect();

    let mut finished = Vec::new();
    for handle in handles {
        let (result, at) = handle.join().unwrap();
        assert!(result.ok());
        finished.push(at);
    }
    finished.sort();

    // The third caller only gets a slot once one of the first two is done,
    // so its insert runs after a full delay has already passed.
    assert!(finished[2] >= Duration::from_millis(200));
    assert!(finished[2] >= finished[0] + Duration::from_millis(50));
    assert!(server.peak_concurrent_inserts() <= 2);
    assert_eq!(server.batch_count(TABLE), 3);
    assert_eq!(server.calls().connects, 2);
    assert_eq!(dispatcher.stats().idle_connections, 2);
}

#[test]
fn test_unreachable_server_reports_network_error() {
    let (server, dispatcher) = start(config().with_max_retries(2));
    for _ in 0..3 {
        server.push_connect_fault(Error::Network("could not resolve host".into()));
    }

    let result = dispatcher.insert(TABLE, &1);
    assert_eq!(result.err_code, ErrorCode::NETWORK_ERROR);
    assert_eq!(server.calls().connects, 3);
    assert_eq!(server.calls().inserts, 0);
    // The slot went back to the pool each time.
    assert_eq!(dispatcher.stats().idle_connections, 1);
}

#[test]
fn test_exhausted_pool_times_out() {
    let (_server, dispatcher) = start(
        config()
            .with_acquire_timeout(Duration::from_millis(50))
            .with_max_retries(1),
    );

    let held = dispatcher.pool().acquire().unwrap();
    let result = dispatcher.insert(TABLE, &1);
    drop(held);

    assert_eq!(result.err_code, ErrorCode::TIMEOUT_EXCEEDED);
    assert!(result.err_msg.contains("can not acquire connection"));
    assert!(dispatcher.insert(TABLE, &2).ok());
}

#[test]
fn test_dropped_session_is_reestablished() {
    let (server, dispatcher) = start(config());
    server.push_insert_fault(Fault::Reject(Error::Network("broken pipe".into())));

    assert!(dispatcher.insert(TABLE, &1).ok());
    assert_eq!(server.calls().resets, 1);
    assert_eq!(server.calls().connects, 1);
}
