// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Exercises the Open Question resolution in DESIGN.md: a request cancelled
//! before it is ever submitted never starts, so none of its completion
//! callbacks fire unless it is separately cleaned — and cleaning does not
//! retroactively invoke them either.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ravel::{Error, Request, WorkerPool, WorkerPoolConfig};

#[test]
fn cancelling_before_submit_never_fires_completion_callbacks() {
    let pool = WorkerPool::new(WorkerPoolConfig::builder(2).build());
    let request: Request<u32> = Request::new_in(&pool, || Ok::<u32, Error>(0));

    let cancelled_fired = Arc::new(AtomicBool::new(false));
    let finished_fired = Arc::new(AtomicBool::new(false));
    let failed_fired = Arc::new(AtomicBool::new(false));

    {
        let flag = Arc::clone(&cancelled_fired);
        request.notify_cancelled(move || flag.store(true, Ordering::SeqCst));
    }
    {
        let flag = Arc::clone(&finished_fired);
        request.notify_finished(move || flag.store(true, Ordering::SeqCst));
    }
    {
        let flag = Arc::clone(&failed_fired);
        request.notify_failed(move || flag.store(true, Ordering::SeqCst));
    }

    assert!(request.cancel(), "an unsubmitted request has no reason to refuse cancellation");

    // Give the pool's workers a moment; there is nothing to run, so this is
    // just guarding against a callback firing from some unexpected path.
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!cancelled_fired.load(Ordering::SeqCst));
    assert!(!finished_fired.load(Ordering::SeqCst));
    assert!(!failed_fired.load(Ordering::SeqCst));

    // Cleaning a never-started, cancelled request drops its bookkeeping
    // without ever invoking the callbacks registered above.
    request.clean();
    assert!(!cancelled_fired.load(Ordering::SeqCst));
    assert!(!finished_fired.load(Ordering::SeqCst));
    assert!(!failed_fired.load(Ordering::SeqCst));

    // The request was never started, so submitting it now would normally
    // run it — but it is cancelled, so waiting on it surfaces as invalid.
    let err = request.submit().and_then(|()| request.wait(None));
    assert!(matches!(err, Err(Error::InvalidRequest)));
}
