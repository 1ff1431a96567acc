// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! The run-permission handoff between a worker's dispatch loop and a
//! request's dedicated execution thread.
//!
//! This is the concrete stand-in for "resume the coroutine" / "the coroutine
//! yields". A [`Gate`] is created once per thread-owning request (see
//! `request/current.rs` for how commandeered requests share their base's
//! gate rather than getting one of their own) and is flipped back and forth
//! between [`Phase::Run`] (the thread may execute) and [`Phase::Yield`] /
//! [`Phase::Done`] (the worker's dispatch loop may move on to the next
//! runnable request) for as long as the request lives.

use std::sync::{Condvar, Mutex};

use crate::constants::ERR_POISONED_LOCK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Nobody has granted a turn yet.
    Idle,
    /// The worker granted a turn; the request thread should run.
    Run,
    /// The request thread suspended at a suspension point.
    Yielded,
    /// The request thread finished its workload for good.
    Done,
}

/// Hands a single cooperative "turn" back and forth between exactly one
/// worker dispatch loop and exactly one dedicated request thread.
#[derive(Debug)]
pub(crate) struct Gate {
    phase: Mutex<Phase>,
    cv: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Idle),
            cv: Condvar::new(),
        }
    }

    /// Called by the request's dedicated thread. Blocks until a worker
    /// grants this request a turn to run.
    pub(crate) fn wait_for_turn(&self) {
        let mut phase = self.phase.lock().expect(ERR_POISONED_LOCK);
        while *phase != Phase::Run {
            phase = self.cv.wait(phase).expect(ERR_POISONED_LOCK);
        }
    }

    /// Called by the request's dedicated thread at a suspension point: gives
    /// the turn back to the worker so it can dispatch something else. The
    /// caller is responsible for actually blocking afterward (typically by
    /// calling [`Gate::wait_for_turn`] again once some other mechanism
    /// re-enqueues it).
    pub(crate) fn yield_turn(&self) {
        let mut phase = self.phase.lock().expect(ERR_POISONED_LOCK);
        *phase = Phase::Yielded;
        self.cv.notify_all();
    }

    /// Called by the request's dedicated thread once its workload has
    /// returned for good. No further turns will ever be granted.
    pub(crate) fn finish(&self) {
        let mut phase = self.phase.lock().expect(ERR_POISONED_LOCK);
        *phase = Phase::Done;
        self.cv.notify_all();
    }

    /// Called by a worker's dispatch loop: grants a turn and blocks until
    /// the request thread either yields (returns `false`) or finishes for
    /// good (returns `true`).
    #[cfg_attr(test, mutants::skip)]
    pub(crate) fn run_until_yield_or_done(&self) -> bool {
        {
            let mut phase = self.phase.lock().expect(ERR_POISONED_LOCK);
            *phase = Phase::Run;
            self.cv.notify_all();
        }
        let mut phase = self.phase.lock().expect(ERR_POISONED_LOCK);
        while *phase == Phase::Run {
            phase = self.cv.wait(phase).expect(ERR_POISONED_LOCK);
        }
        *phase == Phase::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn worker_blocks_until_thread_yields() {
        let gate = Arc::new(Gate::new());
        let worker_gate = Arc::clone(&gate);
        let ran = Arc::new(Mutex::new(false));
        let thread_ran = Arc::clone(&ran);
        let thread_gate = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread_gate.wait_for_turn();
            *thread_ran.lock().expect(ERR_POISONED_LOCK) = true;
            thread_gate.yield_turn();
        });
        let done = worker_gate.run_until_yield_or_done();
        assert!(!done);
        assert!(*ran.lock().expect(ERR_POISONED_LOCK));
        handle.join().expect("thread should not panic");
    }

    #[test]
    fn worker_observes_completion() {
        let gate = Arc::new(Gate::new());
        let worker_gate = Arc::clone(&gate);
        let thread_gate = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread_gate.wait_for_turn();
            thread_gate.finish();
        });
        // Give the spawned thread a moment to be in the race if it loses it;
        // correctness does not actually depend on this, only determinism of
        // the assertion below.
        thread::sleep(Duration::from_millis(1));
        let done = worker_gate.run_until_yield_or_done();
        assert!(done);
        handle.join().expect("thread should not panic");
    }
}
