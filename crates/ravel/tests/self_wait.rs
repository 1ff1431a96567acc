// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! A request that waits on itself before finishing must observe
//! `CircularWait`; the same call made from within its own `finished`
//! callback, after it has already finished, must succeed instead.

use std::sync::{Arc, Mutex};

use ravel::{Error, Request, WorkerPool, WorkerPoolConfig};

#[test]
fn waiting_on_self_before_finishing_is_a_circular_wait() {
    let pool = WorkerPool::new(WorkerPoolConfig::builder(2).build());
    let cell: Arc<Mutex<Option<Request<u32>>>> = Arc::new(Mutex::new(None));
    let cell_in_workload = Arc::clone(&cell);

    let request: Request<u32> = Request::new_in(&pool, move || {
        let me = cell_in_workload
            .lock()
            .expect("cell")
            .clone()
            .expect("set before the worker grants this request a turn");
        match me.wait(None) {
            Err(Error::CircularWait) => Ok(7),
            other => panic!("expected CircularWait, got {other:?}"),
        }
    });
    *cell.lock().expect("cell") = Some(request.clone());
    request.submit().expect("submit");
    assert_eq!(*request.wait(None).expect("request completes"), 7);
}

#[test]
fn waiting_on_self_from_its_own_finished_callback_succeeds() {
    let pool = WorkerPool::new(WorkerPoolConfig::builder(2).build());
    let request: Request<u32> = Request::new_in(&pool, || Ok(7));
    let callback_result: Arc<Mutex<Option<Result<u32, Error>>>> = Arc::new(Mutex::new(None));

    let self_in_callback = request.clone();
    let callback_result_in_callback = Arc::clone(&callback_result);
    request.notify_finished(move || {
        let result = self_in_callback.wait(None).map(|value| *value);
        *callback_result_in_callback.lock().expect("cell") = Some(result);
    });

    request.submit().expect("submit");
    request.wait(None).expect("request completes");

    let result = callback_result
        .lock()
        .expect("cell")
        .take()
        .expect("finished callback ran");
    assert_eq!(result.expect("self-wait from the finished callback succeeds"), 7);
}
