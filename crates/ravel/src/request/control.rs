// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Type-erased control-plane state shared by every request, regardless of
//! its workload's result type.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::constants::ERR_POISONED_LOCK;
use crate::priority::Priority;
use crate::request::gate::Gate;
use crate::signal::Signal;
use crate::worker_pool::PoolHandle;
use crate::Error;

/// Object-safe facet of a request. Every `Request<T>` wraps an
/// `Arc<RequestInner<T>>`, and `RequestInner<T>` implements this trait so
/// relationships (parent, children, waiters) can be stored without knowing
/// `T`.
pub(crate) trait AnyRequest: Send + Sync + fmt::Debug {
    fn control(&self) -> &Control;

    /// Runs the workload to completion, including every Execution-phase
    /// bookkeeping step. Invoked either from a freshly spawned dedicated
    /// thread (after that thread has been granted its first turn) or
    /// synchronously, nested, when this request is commandeered by a waiter
    /// that found it not yet started.
    fn execute(self: Arc<Self>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TerminalStatus {
    Cancelled,
    Failed,
    Succeeded,
}

#[derive(Debug, Default)]
pub(crate) struct Flags {
    pub(crate) started: bool,
    pub(crate) cancelled: bool,
    pub(crate) uncancellable: bool,
    pub(crate) finished: bool,
    pub(crate) execution_complete: bool,
    pub(crate) cleaned: bool,
    pub(crate) status: Option<TerminalStatus>,
}

/// What a request's execution ended with. Mirrors `TerminalStatus` but
/// carries the failure payload at the point it is produced.
pub(crate) enum Outcome {
    Cancelled,
    Failed(Error),
    Succeeded,
}

/// A plain one-shot event a foreign (non-worker) thread can block on, with
/// an optional timeout. This is the non-cooperative fallback suspension
/// mechanism used whenever there is no worker [`Gate`] to suspend against:
/// genuine foreign threads, and debug-mode (synchronous) execution.
#[derive(Debug, Default)]
pub(crate) struct FinishedEvent {
    done: Mutex<bool>,
    cv: Condvar,
}

impl FinishedEvent {
    pub(crate) fn signal(&self) {
        let mut done = self.done.lock().expect(ERR_POISONED_LOCK);
        *done = true;
        self.cv.notify_all();
    }

    pub(crate) fn wait(&self) {
        let mut done = self.done.lock().expect(ERR_POISONED_LOCK);
        while !*done {
            done = self.cv.wait(done).expect(ERR_POISONED_LOCK);
        }
    }

    /// Blocks for at most `timeout`. Returns `true` if the event fired in
    /// time.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock().expect(ERR_POISONED_LOCK);
        while !*done {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, result) = self
                .cv
                .wait_timeout(done, remaining)
                .expect(ERR_POISONED_LOCK);
            done = guard;
            if result.timed_out() && !*done {
                return false;
            }
        }
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[derive(Debug)]
pub(crate) struct Control {
    pub(crate) id: u64,
    pub(crate) priority: Priority,
    pub(crate) parent: Option<Weak<dyn AnyRequest>>,
    pub(crate) next_child_index: AtomicUsize,
    pub(crate) children: Mutex<Vec<Arc<dyn AnyRequest>>>,
    pub(crate) pending_waiters: Mutex<Vec<Arc<dyn AnyRequest>>>,
    pub(crate) blocking_on: Mutex<Option<Arc<dyn AnyRequest>>>,
    pub(crate) flags: Mutex<Flags>,
    pub(crate) failure: Mutex<Option<Error>>,
    pub(crate) assigned_worker: Mutex<Option<usize>>,
    pub(crate) queued: AtomicBool,
    pub(crate) thread_started: AtomicBool,
    pub(crate) gate: Gate,
    pub(crate) finished_event: FinishedEvent,
    pub(crate) finished_signal: Signal,
    pub(crate) cancelled_signal: Signal,
    pub(crate) failed_signal: Signal,
    pub(crate) execution_complete_signal: Signal,
    pub(crate) pool: PoolHandle,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

impl Control {
    pub(crate) fn new(
        priority: Priority,
        parent: Option<Weak<dyn AnyRequest>>,
        inherited_cancelled: bool,
        pool: PoolHandle,
    ) -> Self {
        let flags = Flags {
            cancelled: inherited_cancelled,
            ..Flags::default()
        };
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            priority,
            parent,
            next_child_index: AtomicUsize::new(0),
            children: Mutex::new(Vec::new()),
            pending_waiters: Mutex::new(Vec::new()),
            blocking_on: Mutex::new(None),
            flags: Mutex::new(flags),
            failure: Mutex::new(None),
            assigned_worker: Mutex::new(None),
            queued: AtomicBool::new(false),
            thread_started: AtomicBool::new(false),
            gate: Gate::new(),
            finished_event: FinishedEvent::default(),
            finished_signal: Signal::new(),
            cancelled_signal: Signal::new(),
            failed_signal: Signal::new(),
            execution_complete_signal: Signal::new(),
            pool,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.flags.lock().expect(ERR_POISONED_LOCK).cancelled
    }

    pub(crate) fn is_uncancellable(&self) -> bool {
        self.flags.lock().expect(ERR_POISONED_LOCK).uncancellable
    }

    pub(crate) fn mark_uncancellable(&self) {
        self.flags.lock().expect(ERR_POISONED_LOCK).uncancellable = true;
    }

    pub(crate) fn is_started(&self) -> bool {
        self.flags.lock().expect(ERR_POISONED_LOCK).started
    }

    /// Marks the request started. Returns `false` if it already was
    /// (submit is idempotent).
    pub(crate) fn mark_started(&self) -> bool {
        let mut flags = self.flags.lock().expect(ERR_POISONED_LOCK);
        if flags.started {
            false
        } else {
            flags.started = true;
            true
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.flags.lock().expect(ERR_POISONED_LOCK).finished
    }

    pub(crate) fn is_execution_complete(&self) -> bool {
        self.flags.lock().expect(ERR_POISONED_LOCK).execution_complete
    }

    pub(crate) fn status(&self) -> Option<TerminalStatus> {
        self.flags.lock().expect(ERR_POISONED_LOCK).status
    }

    pub(crate) fn is_cleaned(&self) -> bool {
        self.flags.lock().expect(ERR_POISONED_LOCK).cleaned
    }

    /// Marks the request cleaned. If it was cancelled before ever being
    /// started, drops its completion-callback subscriptions without
    /// invoking them (spec.md §9 Open Question: a never-started cancelled
    /// request never fires `notify_*` callbacks; cleaning it forecloses
    /// that possibility for good instead of leaving them pending forever).
    pub(crate) fn mark_cleaned(&self) {
        self.flags.lock().expect(ERR_POISONED_LOCK).cleaned = true;
        if !self.is_started() {
            self.finished_signal.drop_pending();
            self.cancelled_signal.drop_pending();
            self.failed_signal.drop_pending();
        }
    }

    /// Registers `callback` to run once this request reaches
    /// `execution_complete` (fires immediately if it already has).
    pub(crate) fn on_execution_complete(&self, callback: Box<dyn FnOnce() + Send>) {
        self.execution_complete_signal.subscribe(callback);
    }

    pub(crate) fn failure(&self) -> Option<Error> {
        self.failure.lock().expect(ERR_POISONED_LOCK).clone()
    }

    fn set_failure(&self, error: Error) {
        *self.failure.lock().expect(ERR_POISONED_LOCK) = Some(error);
    }

    /// Attempts to mark this single request cancelled (not its children).
    /// Idempotent: already-cancelled is success.
    fn try_cancel_self(&self) -> bool {
        let mut flags = self.flags.lock().expect(ERR_POISONED_LOCK);
        if flags.cancelled {
            return true;
        }
        if flags.uncancellable {
            return false;
        }
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            if !parent.control().is_cancelled() {
                return false;
            }
        }
        drop(flags);
        {
            let waiters = self.pending_waiters.lock().expect(ERR_POISONED_LOCK);
            if waiters.iter().any(|waiter| !waiter.control().is_cancelled()) {
                return false;
            }
        }
        self.flags.lock().expect(ERR_POISONED_LOCK).cancelled = true;
        true
    }

    fn fire_with_panic_capture(&self, signal: &Signal) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| signal.fire()));
        if let Err(payload) = outcome {
            let message = panic_message(&*payload);
            self.set_failure(Error::internal(format!(
                "completion callback panicked: {message}"
            )));
            if !self.failed_signal.has_fired() {
                self.failed_signal.fire();
            }
        }
    }

    /// Runs the shared "Execution" bookkeeping steps (spec.md §4.B) once a
    /// workload has returned, been absorbed as cancelled, or failed. Does
    /// *not* clear `children`/relationships for non-success outcomes, since
    /// a cancelled or failed request's waiters may still need them.
    pub(crate) fn complete(&self, outcome: Outcome) {
        self.flags.lock().expect(ERR_POISONED_LOCK).finished = true;

        let status = match outcome {
            Outcome::Cancelled => {
                self.fire_with_panic_capture(&self.cancelled_signal);
                TerminalStatus::Cancelled
            }
            Outcome::Failed(error) => {
                self.set_failure(error);
                self.fire_with_panic_capture(&self.failed_signal);
                TerminalStatus::Failed
            }
            Outcome::Succeeded => {
                self.fire_with_panic_capture(&self.finished_signal);
                *self.children.lock().expect(ERR_POISONED_LOCK) = Vec::new();
                TerminalStatus::Succeeded
            }
        };
        self.flags.lock().expect(ERR_POISONED_LOCK).status = Some(status);

        self.flags.lock().expect(ERR_POISONED_LOCK).execution_complete = true;
        self.execution_complete_signal.fire();
        self.finished_event.signal();
    }

    /// Requests re-dispatch of `request` (which must be a *base* request,
    /// i.e. one with its own dedicated thread) on its assigned worker.
    /// No-op in debug mode, where nothing ever suspends on the request
    /// path in the first place.
    pub(crate) fn wake(request: &Arc<dyn AnyRequest>) {
        if request
            .control()
            .queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            request.control().pool.enqueue(Arc::clone(request));
        }
    }
}

/// Attempts to cancel `request` and, if that succeeds, recursively cancels
/// every child captured at that instant (spec.md §4.B `cancel()`).
pub(crate) fn cancel(request: &Arc<dyn AnyRequest>) -> bool {
    if !request.control().try_cancel_self() {
        return false;
    }
    let children = std::mem::take(&mut *request.control().children.lock().expect(ERR_POISONED_LOCK));
    for child in &children {
        cancel(child);
    }
    true
}
