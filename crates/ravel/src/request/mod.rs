// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Component B: the request itself.
//!
//! `Request<T>` is the typed handle client code holds; `RequestInner<T>` is
//! the `Arc`-shared state backing it, implementing [`AnyRequest`] so it can
//! be stored alongside its siblings (parent, children, waiters) without any
//! of them needing to know `T`.

pub(crate) mod control;
pub(crate) mod gate;

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::instrument;

use crate::constants::ERR_POISONED_LOCK;
use crate::current;
use crate::priority::Priority;
use crate::request::control::{AnyRequest, Control, Outcome, TerminalStatus};
use crate::worker_pool::{PoolHandle, WorkerPool};
use crate::{Error, Result};

type Workload<T> = Box<dyn FnOnce() -> Result<T> + Send>;

struct RequestInner<T> {
    control: Control,
    workload: Mutex<Option<Workload<T>>>,
    result: Mutex<Option<Arc<T>>>,
}

impl<T: Send + Sync + 'static> fmt::Debug for RequestInner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInner")
            .field("id", &self.control.id)
            .field("priority", &self.control.priority)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> AnyRequest for RequestInner<T> {
    fn control(&self) -> &Control {
        &self.control
    }

    fn execute(self: Arc<Self>) {
        if self.control.is_cancelled() {
            self.control.complete(Outcome::Cancelled);
            self.control.gate.finish();
            return;
        }
        let workload = self.workload.lock().expect(ERR_POISONED_LOCK).take();
        let Some(workload) = workload else {
            self.control
                .complete(Outcome::Failed(Error::internal(
                    "request executed twice or with no workload",
                )));
            self.control.gate.finish();
            return;
        };
        match workload() {
            Ok(value) => {
                *self.result.lock().expect(ERR_POISONED_LOCK) = Some(Arc::new(value));
                self.control.complete(Outcome::Succeeded);
            }
            Err(Error::Cancelled) => self.control.complete(Outcome::Cancelled),
            Err(other) => self.control.complete(Outcome::Failed(other)),
        }
        self.control.gate.finish();
    }
}

/// A unit of deferred, cancellable, priority-ordered work.
///
/// Constructed from a nullary workload (`Request::new`), started with
/// [`Request::submit`], and awaited with [`Request::wait`]/[`Request::block`].
/// Cloning a `Request` is cheap (it is a handle, `Arc`-backed); every clone
/// refers to the same underlying execution.
pub struct Request<T> {
    inner: Arc<RequestInner<T>>,
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.control.id)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Request<T> {
    /// Constructs a request from a nullary workload.
    ///
    /// If called while executing inside another request's workload, the new
    /// request becomes a *child* of that request: it inherits the parent's
    /// cancellation state at construction time, gets the next priority in
    /// the parent's sequence, and shares the parent's worker pool. Otherwise
    /// it is a root request on [`WorkerPool::global`].
    #[must_use]
    pub fn new<F>(workload: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::new_with_default_pool(WorkerPool::global().handle(), workload)
    }

    /// Like [`Request::new`], but names the pool a *root* request should use.
    /// A request constructed inside another request still inherits that
    /// parent's pool, ignoring `pool`, exactly as [`Request::new`] does.
    #[must_use]
    pub fn new_in<F>(pool: &WorkerPool, workload: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::new_with_default_pool(pool.handle(), workload)
    }

    fn new_with_default_pool<F>(default_pool: PoolHandle, workload: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let parent = current::current();
        let (priority, parent_weak, inherited_cancelled, pool) = match &parent {
            Some(parent) => {
                let index = parent
                    .control()
                    .next_child_index
                    .fetch_add(1, Ordering::Relaxed) as u32;
                (
                    parent.control().priority.child(index),
                    Some(Arc::downgrade(parent)),
                    parent.control().is_cancelled(),
                    Arc::clone(&parent.control().pool),
                )
            }
            None => (
                default_pool.next_root_priority(),
                None,
                false,
                default_pool,
            ),
        };
        let control = Control::new(priority, parent_weak, inherited_cancelled, pool);
        let inner = Arc::new(RequestInner {
            control,
            workload: Mutex::new(Some(Box::new(workload))),
            result: Mutex::new(None),
        });
        if let Some(parent) = &parent {
            let child: Arc<dyn AnyRequest> = Arc::clone(&inner);
            parent
                .control()
                .children
                .lock()
                .expect(ERR_POISONED_LOCK)
                .push(child);
        }
        Self { inner }
    }

    fn as_any(&self) -> Arc<dyn AnyRequest> {
        Arc::clone(&self.inner) as Arc<dyn AnyRequest>
    }

    /// `true` if `self` and `other` are handles to the same underlying
    /// request.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Starts the request on its pool. Idempotent: a second call is a no-op.
    ///
    /// In debug mode (`worker_count == 0`) the workload runs synchronously
    /// on the caller's own stack before this returns, and a captured failure
    /// is rethrown here.
    #[instrument(level = "trace", target = "ravel::request", skip_all, fields(request_id = self.inner.control.id))]
    pub fn submit(&self) -> Result<()> {
        if self.inner.control.mark_started() {
            let handle = Arc::clone(&self.inner.control.pool);
            handle.submit_new(self.as_any());
        }
        if self.inner.control.pool.is_debug() {
            if let Some(failure) = self.inner.control.failure() {
                return Err(failure);
            }
        }
        Ok(())
    }

    /// Waits for the request to reach a terminal state and returns its
    /// result.
    ///
    /// `timeout` is accepted only when called from a foreign (non-worker)
    /// thread; supplying one from inside another request's workload is a
    /// programming error (`Error::Internal`).
    #[instrument(level = "trace", target = "ravel::request", skip_all, fields(request_id = self.inner.control.id))]
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Arc<T>> {
        self.resolve(timeout)?;
        self.inner.result.lock().expect(ERR_POISONED_LOCK).clone().ok_or_else(|| {
            Error::internal("request succeeded but its result was already cleaned")
        })
    }

    /// Like [`Request::wait`], but discards the result. Usable after
    /// [`Request::clean`] has already dropped it.
    pub fn block(&self, timeout: Option<Duration>) -> Result<()> {
        self.resolve(timeout)
    }

    fn resolve(&self, timeout: Option<Duration>) -> Result<()> {
        match current::base() {
            None => self.resolve_foreign(timeout),
            Some(_) => {
                if timeout.is_some() {
                    return Err(Error::internal(
                        "wait() with a timeout is only valid from a foreign thread",
                    ));
                }
                self.resolve_as_request()
            }
        }
    }

    fn resolve_foreign(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.control.mark_uncancellable();
        if !self.inner.control.is_started() && timeout.is_none() {
            let target = self.as_any();
            if self.inner.control.mark_started() {
                current::push(Arc::clone(&target));
                target.execute();
                current::pop();
                return self.final_status();
            }
            // Lost the race: another foreign thread's `mark_started()` won
            // and is running `execute()` directly on its own stack right
            // now. Fall through to the submit+block path below instead of
            // reading a terminal status that may not exist yet — `submit()`
            // is a no-op since the request is already started, and blocking
            // on `finished_event` correctly waits for whichever thread is
            // actually executing it.
        }
        self.submit()?;
        let completed = match timeout {
            Some(duration) => self.inner.control.finished_event.wait_timeout(duration),
            None => {
                self.inner.control.finished_event.wait();
                true
            }
        };
        if !completed {
            return Err(Error::Timeout);
        }
        self.final_status()
    }

    fn resolve_as_request(&self) -> Result<()> {
        let waiter = current::current().unwrap_or_else(|| unreachable!("base implies current"));
        let target = self.as_any();

        if waiter.control().is_cancelled() {
            return Err(Error::Cancelled);
        }
        if Arc::ptr_eq(&waiter, &target) {
            return if self.inner.control.is_finished() {
                Ok(())
            } else {
                Err(Error::CircularWait)
            };
        }
        if self.inner.control.is_cancelled() {
            return Err(Error::InvalidRequest);
        }
        if let Some(failure) = self.inner.control.failure() {
            return Err(failure);
        }
        if self.inner.control.is_execution_complete() {
            return Ok(());
        }
        if !self.inner.control.is_started() {
            let started = self.inner.control.mark_started();
            debug_assert!(started, "is_started() just returned false");
            current::push(Arc::clone(&target));
            target.execute();
            current::pop();
            return self.final_status();
        }

        *waiter.control().blocking_on.lock().expect(ERR_POISONED_LOCK) = Some(Arc::clone(&target));
        self.inner
            .control
            .pending_waiters
            .lock()
            .expect(ERR_POISONED_LOCK)
            .push(Arc::clone(&waiter));

        let base = current::base().unwrap_or_else(|| unreachable!("checked above"));
        // Wake the *base* request (the one with a dedicated thread and an
        // assigned worker), not `waiter`: when a commandeered request
        // suspends, `waiter` is the innermost request but the thread that is
        // actually parked on a gate, and the only one with an
        // `assigned_worker` to re-dispatch, is `base`.
        let waker = Arc::clone(&base);
        self.inner
            .control
            .on_execution_complete(Box::new(move || Control::wake(&waker)));

        base.control().gate.yield_turn();
        base.control().gate.wait_for_turn();

        *waiter.control().blocking_on.lock().expect(ERR_POISONED_LOCK) = None;
        self.inner
            .control
            .pending_waiters
            .lock()
            .expect(ERR_POISONED_LOCK)
            .retain(|pending| !Arc::ptr_eq(pending, &waiter));

        if waiter.control().is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.final_status()
    }

    fn final_status(&self) -> Result<()> {
        match self.inner.control.status() {
            Some(TerminalStatus::Succeeded) => Ok(()),
            Some(TerminalStatus::Failed) => Err(self
                .inner
                .control
                .failure()
                .unwrap_or_else(|| Error::internal("failed status recorded without a failure"))),
            Some(TerminalStatus::Cancelled) => Err(Error::InvalidRequest),
            None => Err(Error::internal("observed completion without a terminal status")),
        }
    }

    /// Requests cancellation of this request and, if it was itself
    /// cancellable, every descendant captured at that instant.
    ///
    /// Returns `true` if this request was actually marked cancelled (it may
    /// refuse: already started-and-uncancellable, an uncancelled ancestor,
    /// or a not-yet-cancelled pending waiter).
    pub fn cancel(&self) -> bool {
        control::cancel(&self.as_any())
    }

    /// `true` if this request has been marked cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.control.is_cancelled()
    }

    /// `true` if this request has reached a terminal state and every
    /// registered completion callback has finished running.
    #[must_use]
    pub fn is_execution_complete(&self) -> bool {
        self.inner.control.is_execution_complete()
    }

    /// Returns the stored result, if the request has succeeded and has not
    /// been [`Request::clean`]ed.
    #[must_use]
    pub fn result(&self) -> Option<Arc<T>> {
        self.inner.result.lock().expect(ERR_POISONED_LOCK).clone()
    }

    /// Registers `callback` to run when the request finishes successfully.
    /// Runs immediately, on the caller's thread, if it already has.
    pub fn notify_finished(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.control.finished_signal.subscribe(Box::new(callback));
    }

    /// Registers `callback` to run when the request's workload fails. Runs
    /// immediately, on the caller's thread, if it already has.
    pub fn notify_failed(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.control.failed_signal.subscribe(Box::new(callback));
    }

    /// Registers `callback` to run when the request is cancelled. Runs
    /// immediately, on the caller's thread, if it already has.
    pub fn notify_cancelled(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.control.cancelled_signal.subscribe(Box::new(callback));
    }

    /// Drops the stored result, if any, to free memory once it is no longer
    /// needed. Subsequent [`Request::wait`] calls will fail; use
    /// [`Request::block`] instead.
    pub fn clean(&self) {
        self.inner.control.mark_cleaned();
        *self.inner.result.lock().expect(ERR_POISONED_LOCK) = None;
    }
}
