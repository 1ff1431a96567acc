// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Ten requests each acquire the same lock, append their id to a shared
//! list, then release. A small stagger on submission keeps the order in
//! which each request actually calls `acquire` deterministic; the lock's
//! FIFO handoff guarantee (spec.md §4.C) then pins the append order to
//! match it exactly.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ravel::{Error, Request, RequestLock, WorkerPool, WorkerPoolConfig};

#[test]
fn appends_happen_in_acquire_order() {
    let pool = WorkerPool::new(WorkerPoolConfig::builder(4).build());
    let lock = Arc::new(RequestLock::new());
    let appends: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

    let requests: Vec<_> = (0..10u32)
        .map(|id| {
            let lock = Arc::clone(&lock);
            let appends = Arc::clone(&appends);
            Request::new_in(&pool, move || {
                thread::sleep(Duration::from_millis(u64::from(id) * 20));
                let guard = lock.lock()?;
                appends.lock().expect("appends").push(id);
                drop(guard);
                Ok::<(), Error>(())
            })
        })
        .collect();

    for request in &requests {
        request.submit().expect("submit");
    }
    for request in &requests {
        request.wait(None).expect("request completes");
    }

    let observed = appends.lock().expect("appends").clone();
    assert_eq!(observed, (0..10u32).collect::<Vec<_>>());
}
