// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Thread-local bookkeeping for "what request (if any) is running on this
//! thread right now".
//!
//! Two separate pieces of state are tracked, deliberately kept apart:
//!
//! - [`current`]: the innermost request actually executing on this OS
//!   thread. Pushed/popped around every workload invocation, including
//!   commandeered ones, so self-wait detection and the
//!   `is_current_request_cancelled` helper work no matter how deeply nested
//!   the commandeering got.
//! - [`base`]: the request that owns this OS thread's [`crate::request::control::AnyRequest::execute`]
//!   dispatch slot, i.e. the one with a live [`crate::request::gate::Gate`]
//!   tied to a worker's runqueue. `None` on a foreign thread *and* on a
//!   thread running a debug-mode (synchronous) pool, even while a request is
//!   executing there — both cases have nowhere to suspend to, so they fall
//!   back to the foreign-thread blocking path at every suspension point.

use std::cell::RefCell;
use std::sync::Arc;

use crate::request::control::AnyRequest;

thread_local! {
    static STACK: RefCell<Vec<Arc<dyn AnyRequest>>> = const { RefCell::new(Vec::new()) };
    static BASE: RefCell<Option<Arc<dyn AnyRequest>>> = const { RefCell::new(None) };
}

pub(crate) fn push(request: Arc<dyn AnyRequest>) {
    STACK.with(|stack| stack.borrow_mut().push(request));
}

pub(crate) fn pop() {
    STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

pub(crate) fn current() -> Option<Arc<dyn AnyRequest>> {
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Marks this thread as the dedicated execution thread for `request`. Called
/// exactly once, right when a worker spawns a request's dedicated thread.
pub(crate) fn set_base(request: Arc<dyn AnyRequest>) {
    BASE.with(|base| *base.borrow_mut() = Some(request));
}

pub(crate) fn base() -> Option<Arc<dyn AnyRequest>> {
    BASE.with(|base| base.borrow().clone())
}

/// Returns `true` if the innermost currently executing request has been
/// cancelled.
///
/// Exposed so workload code can poll for cancellation between suspension
/// points instead of only discovering it at the next `wait`/`acquire`.
#[must_use]
pub fn is_current_request_cancelled() -> bool {
    current().is_some_and(|request| request.control().is_cancelled())
}

/// Returns [`crate::Error::Cancelled`] if the innermost currently executing
/// request has been cancelled, `Ok(())` otherwise.
pub fn raise_if_current_request_cancelled() -> crate::Result<()> {
    if is_current_request_cancelled() {
        Err(crate::Error::Cancelled)
    } else {
        Ok(())
    }
}
