// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! One consumer request loops on a `RequestCondition`, draining a shared
//! queue as three producer requests each push a handful of items and
//! notify. Every item produced must be consumed, with no lost wakeups.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ravel::{Error, Request, RequestCondition, WorkerPool, WorkerPoolConfig};

#[test]
fn every_produced_item_is_consumed() {
    let pool = WorkerPool::new(WorkerPoolConfig::builder(4).build());
    let condition = Arc::new(RequestCondition::new());
    let queue: Arc<Mutex<VecDeque<u32>>> = Arc::new(Mutex::new(VecDeque::new()));
    let done = Arc::new(AtomicBool::new(false));

    let consumer: Request<usize> = {
        let condition = Arc::clone(&condition);
        let queue = Arc::clone(&queue);
        let done = Arc::clone(&done);
        Request::new_in(&pool, move || {
            let mut total = 0usize;
            let guard = condition.lock()?;
            loop {
                while let Some(_item) = queue.lock().expect("queue").pop_front() {
                    total += 1;
                }
                if done.load(Ordering::SeqCst) && queue.lock().expect("queue").is_empty() {
                    return Ok::<usize, Error>(total);
                }
                guard.wait()?;
            }
        })
    };
    consumer.submit().expect("submit consumer");

    let producers: Vec<Request<()>> = (0..3u32)
        .map(|p| {
            let condition = Arc::clone(&condition);
            let queue = Arc::clone(&queue);
            Request::new_in(&pool, move || {
                for item in 0..5u32 {
                    let guard = condition.lock()?;
                    queue.lock().expect("queue").push_back(p * 100 + item);
                    guard.notify();
                }
                Ok::<(), Error>(())
            })
        })
        .collect();
    for producer in &producers {
        producer.submit().expect("submit producer");
    }
    for producer in &producers {
        producer.wait(None).expect("producer completes");
    }

    done.store(true, Ordering::SeqCst);
    condition.acquire(true).expect("foreign acquire");
    condition.notify();
    condition.release();

    let total = *consumer.wait(None).expect("consumer completes");
    assert_eq!(total, 15);
}
