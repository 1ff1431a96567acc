// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Component D: the request-aware condition variable.
//!
//! Supports a single consumer and any number of producers. Built directly on
//! top of two [`RequestLock`]s rather than any new suspension primitive: the
//! "waiter lock, acquired twice" idiom below is the whole implementation.

use crate::lock::RequestLock;
use crate::Result;

/// A single-consumer, multi-producer condition variable over a [`RequestLock`]
/// the caller already holds. See spec.md §4.D.
///
/// Unlike [`std::sync::Condvar`], `RequestCondition` owns its own protecting
/// lock (the "ownership lock") rather than borrowing one supplied at each
/// call, and supports exactly one waiting consumer at a time.
#[derive(Debug, Default)]
pub struct RequestCondition {
    ownership_lock: RequestLock,
    waiter_lock: RequestLock,
}

impl RequestCondition {
    /// Creates a condition with both locks unlocked.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ownership_lock: RequestLock::new(),
            waiter_lock: RequestLock::new(),
        }
    }

    /// Acquires the ownership lock. See [`RequestLock::acquire`].
    pub fn acquire(&self, blocking: bool) -> Result<bool> {
        self.ownership_lock.acquire(blocking)
    }

    /// Releases the ownership lock.
    pub fn release(&self) {
        self.ownership_lock.release();
    }

    /// Acquires the ownership lock and returns a guard that releases it on
    /// drop.
    pub fn lock(&self) -> Result<RequestConditionGuard<'_>> {
        self.acquire(true)?;
        Ok(RequestConditionGuard { condition: self })
    }

    /// Waits for a [`RequestCondition::notify`] from another holder of the
    /// ownership lock.
    ///
    /// The caller must already hold the ownership lock; it is released for
    /// the duration of the wait and reacquired before this returns (or before
    /// an `Err` is returned, in every case except suspension being cut short
    /// by cancellation — a cancelled waiter does not reacquire the ownership
    /// lock and must not assume it still holds it).
    ///
    /// Only one request may be waiting at a time; a second concurrent waiter
    /// would deadlock against the first on the waiter lock's "must currently
    /// be unlocked" precondition.
    pub fn wait(&self) -> Result<()> {
        self.waiter_lock.acquire(true)?;
        self.ownership_lock.release();
        self.waiter_lock.acquire(true)?;
        self.ownership_lock.acquire(true)?;
        if self.waiter_lock.locked() {
            self.waiter_lock.release();
        }
        Ok(())
    }

    /// Wakes the single waiting consumer, if any.
    ///
    /// The caller must already hold the ownership lock.
    pub fn notify(&self) {
        if self.waiter_lock.locked() {
            self.waiter_lock.release();
        }
    }
}

/// RAII guard returned by [`RequestCondition::lock`]. Releases the ownership
/// lock when dropped.
#[derive(Debug)]
#[must_use = "the lock is released when this guard is dropped"]
pub struct RequestConditionGuard<'a> {
    condition: &'a RequestCondition,
}

impl RequestConditionGuard<'_> {
    /// Waits on the enclosing condition, as [`RequestCondition::wait`].
    pub fn wait(&self) -> Result<()> {
        self.condition.wait()
    }

    /// Notifies the enclosing condition, as [`RequestCondition::notify`].
    pub fn notify(&self) {
        self.condition.notify();
    }
}

impl Drop for RequestConditionGuard<'_> {
    fn drop(&mut self) {
        self.condition.release();
    }
}
