// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Component C: the request-aware lock.
//!
//! A mutual-exclusion primitive whose contended path suspends the *request*
//! that failed to acquire it — freeing its worker to run other work —
//! instead of blocking an OS thread the way a plain `std::sync::Mutex`
//! would. A foreign (non-worker) thread contending for the same lock
//! genuinely blocks, since it has no worker slot to give back.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use tracing::instrument;

use crate::constants::ERR_POISONED_LOCK;
use crate::current;
use crate::request::control::{AnyRequest, Control};
use crate::{Error, Result};

/// A one-shot wakeup ticket handed to a foreign thread parked in
/// [`RequestLock::acquire`]. Constructed fresh on the waiting thread's own
/// stack for each blocking call.
struct Ticket {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl Ticket {
    fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut ready = self.ready.lock().expect(ERR_POISONED_LOCK);
        while !*ready {
            ready = self.cv.wait(ready).expect(ERR_POISONED_LOCK);
        }
    }

    fn unpark(&self) {
        let mut ready = self.ready.lock().expect(ERR_POISONED_LOCK);
        *ready = true;
        self.cv.notify_all();
    }
}

enum Waiter {
    Request(Arc<dyn AnyRequest>),
    Foreign(Arc<Ticket>),
}

struct LockState {
    locked: bool,
    queue: VecDeque<Waiter>,
}

/// A mutex whose contended acquisition suspends the calling request rather
/// than blocking its worker. See spec.md §4.C.
#[derive(Debug)]
pub struct RequestLock {
    state: Mutex<LockState>,
}

impl std::fmt::Debug for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockState")
            .field("locked", &self.locked)
            .field("waiting", &self.queue.len())
            .finish()
    }
}

impl Default for RequestLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLock {
    /// Creates an unlocked request-lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                locked: false,
                queue: VecDeque::new(),
            }),
        }
    }

    /// `true` if the lock is currently held by anyone.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.state.lock().expect(ERR_POISONED_LOCK).locked
    }

    /// Attempts to acquire the lock. If `blocking` is `false` and the lock
    /// is already held, returns `Ok(false)` immediately without enqueuing.
    /// If `blocking` is `true`, suspends (a request caller) or blocks (a
    /// foreign-thread caller) until the lock is handed to the caller or the
    /// caller's request is cancelled while suspended.
    #[instrument(level = "trace", target = "ravel::lock", skip(self))]
    pub fn acquire(&self, blocking: bool) -> Result<bool> {
        {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
            if !state.locked {
                state.locked = true;
                return Ok(true);
            }
            if !blocking {
                return Ok(false);
            }
            match current::base() {
                Some(_) => {
                    let me = current::current()
                        .unwrap_or_else(|| unreachable!("a base thread always has a current request"));
                    state.queue.push_back(Waiter::Request(Arc::clone(&me)));
                }
                None => {
                    let ticket = Arc::new(Ticket::new());
                    state.queue.push_back(Waiter::Foreign(Arc::clone(&ticket)));
                    drop(state);
                    ticket.wait();
                    return Ok(true);
                }
            }
        }
        // Only the request path falls through to here; the foreign path
        // already returned above.
        let base = current::base().unwrap_or_else(|| unreachable!("checked above"));
        let me = current::current().unwrap_or_else(|| unreachable!("checked above"));
        base.control().gate.yield_turn();
        base.control().gate.wait_for_turn();
        if me.control().is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(true)
    }

    /// Releases the lock. If other callers are queued, hands ownership
    /// directly to the one at the head of the FIFO queue rather than
    /// dropping back to an unlocked state.
    #[instrument(level = "trace", target = "ravel::lock", skip(self))]
    pub fn release(&self) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
        match state.queue.pop_front() {
            None => state.locked = false,
            Some(Waiter::Request(request)) => {
                drop(state);
                Control::wake(&request);
            }
            Some(Waiter::Foreign(ticket)) => {
                drop(state);
                ticket.unpark();
            }
        }
    }

    /// Acquires the lock and returns a guard that releases it on drop.
    pub fn lock(&self) -> Result<RequestLockGuard<'_>> {
        self.acquire(true)?;
        Ok(RequestLockGuard { lock: self })
    }
}

/// RAII guard returned by [`RequestLock::lock`]. Releases the lock when
/// dropped.
#[derive(Debug)]
#[must_use = "the lock is released when this guard is dropped"]
pub struct RequestLockGuard<'a> {
    lock: &'a RequestLock,
}

impl Drop for RequestLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
