// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! One-shot, append-only, multi-subscriber completion signals.
//!
//! Grounded on `oxidizer_rt`'s `once_event::shared` state machine
//! (`NotSet | Awaiting | Set | Consumed`), generalized from "one waker" to
//! "an append-only list of callbacks" and from "fires once with a value" to
//! "fires once, then any late subscriber runs immediately".

use std::sync::Mutex;

use crate::constants::ERR_POISONED_LOCK;

/// A boxed, type-erased completion callback.
pub(crate) type Callback = Box<dyn FnOnce() + Send>;

enum State {
    /// No one has fired yet; holds whatever callbacks subscribed so far.
    Idle(Vec<Callback>),
    /// Fired exactly once; every future subscriber runs immediately.
    Fired,
}

/// A signal that fires at most once. Subscribing after it has fired invokes
/// the callback inline rather than queuing it, so there is no
/// subscribe-after-fire race.
pub(crate) struct Signal {
    state: Mutex<State>,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle(Vec::new())),
        }
    }

    /// Registers `callback` to run when the signal fires. Runs it
    /// immediately, on the calling thread, if the signal already fired.
    pub(crate) fn subscribe(&self, callback: Callback) {
        let mut guard = self.state.lock().expect(ERR_POISONED_LOCK);
        match &mut *guard {
            State::Idle(pending) => pending.push(callback),
            State::Fired => {
                drop(guard);
                callback();
            }
        }
    }

    /// Fires the signal, running every subscribed callback exactly once.
    /// A second call is a no-op: the signal is append-only and fires once.
    #[cfg_attr(test, mutants::skip)]
    pub(crate) fn fire(&self) {
        let pending = {
            let mut guard = self.state.lock().expect(ERR_POISONED_LOCK);
            match std::mem::replace(&mut *guard, State::Fired) {
                State::Idle(pending) => pending,
                State::Fired => {
                    // Already fired; put it back and do nothing further.
                    *guard = State::Fired;
                    return;
                }
            }
        };
        for callback in pending {
            callback();
        }
    }

    /// True once [`Signal::fire`] has run.
    pub(crate) fn has_fired(&self) -> bool {
        matches!(&*self.state.lock().expect(ERR_POISONED_LOCK), State::Fired)
    }

    /// Discards any callbacks subscribed so far without invoking them, and
    /// marks the signal as if it had fired (so a later, redundant
    /// [`Signal::fire`] — e.g. from submitting a request that was cancelled
    /// before it ever started, then cleaned — is a harmless no-op rather
    /// than resurrecting the dropped callbacks). A no-op if already fired.
    pub(crate) fn drop_pending(&self) {
        let mut guard = self.state.lock().expect(ERR_POISONED_LOCK);
        if matches!(&*guard, State::Idle(_)) {
            *guard = State::Fired;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_each_subscriber_exactly_once() {
        let signal = Signal::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let count = Arc::clone(&count);
            signal.subscribe(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        signal.fire();
        signal.fire();
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn late_subscriber_runs_immediately() {
        let signal = Signal::new();
        signal.fire();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        signal.subscribe(Box::new(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn has_fired_reflects_state() {
        let signal = Signal::new();
        assert!(!signal.has_fired());
        signal.fire();
        assert!(signal.has_fired());
    }
}
