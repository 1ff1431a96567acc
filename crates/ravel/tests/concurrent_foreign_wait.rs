// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Several foreign threads call `wait(None)` on the same not-yet-started
//! request at once. Exactly one of them wins the race to run it directly on
//! its own stack (the foreign "run it here" optimization); every other
//! thread must fall through to blocking on the request's completion instead
//! of observing a not-yet-recorded terminal status.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use ravel::{Error, Request, WorkerPool, WorkerPoolConfig};

#[test]
fn every_foreign_waiter_observes_the_same_result() {
    let pool = WorkerPool::new(WorkerPoolConfig::builder(2).build());
    let runs = Arc::new(AtomicU32::new(0));
    let runs_in_workload = Arc::clone(&runs);
    let request: Request<u32> = Request::new_in(&pool, move || {
        runs_in_workload.fetch_add(1, Ordering::SeqCst);
        // Widens the window in which the other waiters are still past the
        // barrier but have not yet reached the winning thread's
        // `mark_started()`, so they genuinely observe "already started, not
        // yet complete" rather than the race resolving before they look.
        thread::sleep(Duration::from_millis(50));
        Ok::<u32, Error>(7)
    });

    const WAITERS: usize = 8;
    let barrier = Arc::new(Barrier::new(WAITERS));
    let handles: Vec<_> = (0..WAITERS)
        .map(|_| {
            let request = request.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                *request.wait(None).expect("every waiter sees the same completion")
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("waiter thread should not panic"), 7);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1, "the workload must run exactly once");
}
