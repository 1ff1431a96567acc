// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Component E: the request pool.
//!
//! Submits a static batch of requests and waits for all of them, discarding
//! each one as soon as possible after it completes so a large batch's peak
//! memory cost stays bounded. See spec.md §4.E.
//!
//! `RequestPool::submit` is deliberately not a cooperative suspension point:
//! spec.md §5's suspension-points list names only a request's `wait`, a
//! contended lock's `acquire`, and a condition's `wait` — pool submission
//! throttling (`with_max_active`) is plain OS-thread blocking instead.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::constants::ERR_POISONED_LOCK;
use crate::request::Request;
use crate::{Error, Result};

struct Throttle {
    max: usize,
    count: Mutex<usize>,
    cv: Condvar,
}

impl Throttle {
    fn new(max: usize) -> Self {
        Self {
            max,
            count: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut count = self.count.lock().expect(ERR_POISONED_LOCK);
        while *count >= self.max {
            count = self.cv.wait(count).expect(ERR_POISONED_LOCK);
        }
        *count += 1;
    }

    fn release(&self) {
        let mut count = self.count.lock().expect(ERR_POISONED_LOCK);
        *count = count.saturating_sub(1);
        self.cv.notify_one();
    }
}

struct PoolState<T: Send + Sync + 'static> {
    active: Vec<Request<T>>,
    finishing: Vec<Request<T>>,
}

struct PoolInner<T: Send + Sync + 'static> {
    state: Mutex<PoolState<T>>,
    submitted: AtomicBool,
    throttle: Option<Throttle>,
}

impl<T: Send + Sync + 'static> PoolInner<T> {
    fn move_to_finishing(self: &Arc<Self>, request: Request<T>) {
        {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
            state.active.retain(|active| !active.is_same(&request));
            state.finishing.push(request);
        }
        if let Some(throttle) = &self.throttle {
            throttle.release();
        }
    }
}

fn schedule_move_to_finishing<T: Send + Sync + 'static>(
    inner: &Arc<PoolInner<T>>,
    request: &Request<T>,
) {
    let for_finished = Arc::clone(inner);
    let req_finished = request.clone();
    request.notify_finished(move || for_finished.move_to_finishing(req_finished));

    let for_cancelled = Arc::clone(inner);
    let req_cancelled = request.clone();
    request.notify_cancelled(move || for_cancelled.move_to_finishing(req_cancelled));

    let for_failed = Arc::clone(inner);
    let req_failed = request.clone();
    request.notify_failed(move || for_failed.move_to_finishing(req_failed));
}

/// A statically-sized batch of requests, submitted and awaited together with
/// bounded peak memory (each request is dropped from the pool's own tracking
/// as soon as it completes).
pub struct RequestPool<T: Send + Sync + 'static> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Send + Sync + 'static> Default for RequestPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for RequestPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        f.debug_struct("RequestPool")
            .field("active", &state.active.len())
            .field("finishing", &state.finishing.len())
            .field("submitted", &self.inner.submitted.load(Ordering::Acquire))
            .finish()
    }
}

impl<T: Send + Sync + 'static> RequestPool<T> {
    /// Creates an empty pool with no limit on concurrently submitted
    /// requests.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    active: Vec::new(),
                    finishing: Vec::new(),
                }),
                submitted: AtomicBool::new(false),
                throttle: None,
            }),
        }
    }

    /// Creates an empty pool whose [`RequestPool::submit`] keeps at most
    /// `max_active` requests submitted-but-not-yet-finishing at a time,
    /// queuing the rest on the caller's own thread until earlier ones move
    /// into `finishing`.
    #[must_use]
    pub fn with_max_active(max_active: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    active: Vec::new(),
                    finishing: Vec::new(),
                }),
                submitted: AtomicBool::new(false),
                throttle: Some(Throttle::new(max_active)),
            }),
        }
    }

    /// Adds `request` to the batch. Fails with [`Error::PoolStarted`] if
    /// [`RequestPool::submit`] has already been called.
    pub fn add(&self, request: Request<T>) -> Result<()> {
        if self.inner.submitted.load(Ordering::Acquire) {
            return Err(Error::PoolStarted);
        }
        schedule_move_to_finishing(&self.inner, &request);
        self.inner.state.lock().expect(ERR_POISONED_LOCK).active.push(request);
        Ok(())
    }

    /// Submits every request currently in the batch. Adding further requests
    /// after this is forbidden (see [`RequestPool::add`]).
    pub fn submit(&self) -> Result<()> {
        self.inner.submitted.store(true, Ordering::Release);
        let snapshot = self.inner.state.lock().expect(ERR_POISONED_LOCK).active.clone();
        for request in snapshot {
            if let Some(throttle) = &self.inner.throttle {
                throttle.acquire();
            }
            request.submit()?;
        }
        Ok(())
    }

    /// Blocks until every request in the batch has reached
    /// `execution_complete` — i.e. every completion callback has already
    /// run. Drains `finishing` first, then blocks on one arbitrary `active`
    /// request at a time (which, via its own completion callback, moves
    /// itself into `finishing` before this call returns), repeating until
    /// `active` is empty, then drains `finishing` one final time.
    pub fn wait(&self) -> Result<()> {
        loop {
            if let Some(request) = self.pop_finishing() {
                request.block(None)?;
                continue;
            }
            let Some(request) = self.peek_active() else {
                break;
            };
            request.block(None)?;
        }
        while let Some(request) = self.pop_finishing() {
            request.block(None)?;
        }
        Ok(())
    }

    /// Cancels every request currently in `active`. Requests already past
    /// execution (in `finishing`) are left alone: their workloads have
    /// already returned, so cancelling them now would have no effect beyond
    /// racing their completion callbacks.
    pub fn cancel(&self) {
        let snapshot = self.inner.state.lock().expect(ERR_POISONED_LOCK).active.clone();
        for request in snapshot {
            request.cancel();
        }
    }

    /// Drops the stored result of every request still tracked by the pool.
    pub fn clean(&self) {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        for request in state.active.iter().chain(state.finishing.iter()) {
            request.clean();
        }
    }

    /// Number of requests still tracked (not yet fully `execution_complete`).
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.active.len() + state.finishing.len()
    }

    /// `true` if no requests are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop_finishing(&self) -> Option<Request<T>> {
        self.inner.state.lock().expect(ERR_POISONED_LOCK).finishing.pop()
    }

    fn peek_active(&self) -> Option<Request<T>> {
        self.inner.state.lock().expect(ERR_POISONED_LOCK).active.first().cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::config::WorkerPoolConfig;
    use crate::request::Request;
    use crate::worker_pool::WorkerPool;
    use crate::Error;

    use super::RequestPool;

    #[test]
    fn waits_for_every_submitted_request() {
        let worker_pool = WorkerPool::new(WorkerPoolConfig::builder(4).build());
        let pool = RequestPool::new();
        let completed = Arc::new(AtomicU32::new(0));
        for _ in 0..20 {
            let completed = Arc::clone(&completed);
            let request = Request::new_in(&worker_pool, move || {
                completed.fetch_add(1, Ordering::SeqCst);
                Ok::<(), Error>(())
            });
            pool.add(request).expect("add before submit");
        }
        pool.submit().expect("submit");
        pool.wait().expect("wait");
        assert_eq!(completed.load(Ordering::SeqCst), 20);
        assert!(pool.is_empty());
    }

    #[test]
    fn add_after_submit_fails() {
        let worker_pool = WorkerPool::new(WorkerPoolConfig::builder(1).build());
        let pool = RequestPool::new();
        pool.add(Request::new_in(&worker_pool, || Ok::<(), Error>(())))
            .expect("add before submit");
        pool.submit().expect("submit");
        pool.wait().expect("wait");
        let late = Request::new_in(&worker_pool, || Ok::<(), Error>(()));
        assert!(matches!(pool.add(late), Err(Error::PoolStarted)));
    }

    #[test]
    fn max_active_throttles_concurrent_submission() {
        let worker_pool = WorkerPool::new(WorkerPoolConfig::builder(2).build());
        let pool = RequestPool::with_max_active(2);
        for n in 0..10u32 {
            pool.add(Request::new_in(&worker_pool, move || Ok::<u32, Error>(n)))
                .expect("add");
        }
        pool.submit().expect("submit");
        pool.wait().expect("wait");
        assert!(pool.is_empty());
    }

    #[test]
    fn cancel_only_touches_still_active_requests() {
        let worker_pool = WorkerPool::new(WorkerPoolConfig::builder(1).build());
        let pool = RequestPool::new();
        let first = Request::new_in(&worker_pool, || Ok::<u32, Error>(1));
        pool.add(first.clone()).expect("add");
        pool.submit().expect("submit");
        first.wait(None).expect("first request completes");
        // `first` has already moved into `finishing`; cancelling the pool
        // now must not touch it (nor can it retroactively un-complete it).
        pool.cancel();
        assert_eq!(*first.result().expect("result still present"), 1);
    }
}
