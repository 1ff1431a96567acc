// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Component A: the worker pool.
//!
//! Owns a fixed set of workers, each a single dispatch thread pulling the
//! highest-priority runnable request off its own priority queue. Grounded on
//! the std `Mutex`+`Condvar`-driven priority runqueue pattern (as opposed to
//! `crossbeam-channel`/`rayon`, which the rejected teacher candidate used),
//! to stay faithful to this corpus's own std-synchronization idiom.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, instrument, trace, warn};

use crate::config::WorkerPoolConfig;
use crate::constants::ERR_POISONED_LOCK;
use crate::current;
use crate::priority::Priority;
use crate::request::control::AnyRequest;

// Re-exported only so `Control` (which lives in `request::control`) can name
// the handle type without a cyclic `pub use`.
pub(crate) type PoolHandle = Arc<WorkerPoolInner>;

struct QueueEntry(Arc<dyn AnyRequest>);

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.control().priority == other.0.control().priority
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` is a max-heap; reverse the comparison so the
        // numerically smallest (highest-priority, per spec.md §3) entry
        // pops first.
        other.0.control().priority.cmp(&self.0.control().priority)
    }
}

struct WorkerState {
    id: usize,
    queue: Mutex<BinaryHeap<QueueEntry>>,
    cv: Condvar,
    load: AtomicUsize,
    shutdown: AtomicBool,
}

impl WorkerState {
    fn push(&self, request: Arc<dyn AnyRequest>) {
        let mut queue = self.queue.lock().expect(ERR_POISONED_LOCK);
        queue.push(QueueEntry(request));
        self.cv.notify_one();
    }

    fn pop_blocking(&self) -> Option<Arc<dyn AnyRequest>> {
        let mut queue = self.queue.lock().expect(ERR_POISONED_LOCK);
        loop {
            if let Some(entry) = queue.pop() {
                return Some(entry.0);
            }
            if self.shutdown.load(AtomicOrdering::Acquire) {
                return None;
            }
            queue = self.cv.wait(queue).expect(ERR_POISONED_LOCK);
        }
    }
}

/// Internal, reference-counted worker pool state. Public API lives on
/// [`crate::WorkerPool`].
pub(crate) struct WorkerPoolInner {
    config: WorkerPoolConfig,
    workers: Vec<Arc<WorkerState>>,
    dispatch_threads: Mutex<Vec<JoinHandle<()>>>,
    next_root_priority: AtomicU32,
}

impl WorkerPoolInner {
    fn new(config: WorkerPoolConfig) -> Self {
        let worker_count = config.worker_count;
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            workers.push(Arc::new(WorkerState {
                id,
                queue: Mutex::new(BinaryHeap::new()),
                cv: Condvar::new(),
                load: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
            }));
        }
        Self {
            config,
            workers,
            dispatch_threads: Mutex::new(Vec::new()),
            next_root_priority: AtomicU32::new(0),
        }
    }

    fn start(self: &Arc<Self>) {
        let mut handles = self.dispatch_threads.lock().expect(ERR_POISONED_LOCK);
        for worker in &self.workers {
            let worker = Arc::clone(worker);
            let stack_size = self.config.stack_size;
            let name = format!("{}-{}", self.config.thread_name_prefix, worker.id);
            let mut builder = thread::Builder::new().name(name);
            if let Some(size) = stack_size {
                builder = builder.stack_size(size);
            }
            let spawned = builder.spawn(move || dispatch_loop(&worker, stack_size));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!(target: "ravel::worker_pool", error = %err, "failed to spawn worker dispatch thread"),
            }
        }
    }

    pub(crate) fn is_debug(&self) -> bool {
        self.config.is_debug()
    }

    pub(crate) fn next_root_priority(&self) -> Priority {
        Priority::root(&self.next_root_priority)
    }

    fn least_loaded(&self) -> &Arc<WorkerState> {
        self.workers
            .iter()
            .min_by_key(|worker| worker.load.load(AtomicOrdering::Relaxed))
            .expect("debug-mode pools never call least_loaded")
    }

    /// Assigns `request` to a worker for the first time (or, in debug mode,
    /// runs it synchronously right here) and enqueues it.
    #[instrument(level = "trace", target = "ravel::worker_pool", skip_all, fields(request_id = request.control().id))]
    pub(crate) fn submit_new(&self, request: Arc<dyn AnyRequest>) {
        if self.is_debug() {
            trace!(target: "ravel::worker_pool", "running request synchronously (debug mode)");
            current::push(Arc::clone(&request));
            Arc::clone(&request).execute();
            current::pop();
            return;
        }
        let worker = self.least_loaded();
        *request.control().assigned_worker.lock().expect(ERR_POISONED_LOCK) = Some(worker.id);
        worker.load.fetch_add(1, AtomicOrdering::AcqRel);
        worker.push(request);
    }

    /// Re-enqueues an already-assigned request on its owner worker's queue.
    pub(crate) fn enqueue(&self, request: Arc<dyn AnyRequest>) {
        debug_assert!(!self.is_debug(), "enqueue should be unreachable in debug mode");
        let worker_id = request
            .control()
            .assigned_worker
            .lock()
            .expect(ERR_POISONED_LOCK)
            .unwrap_or_else(|| unreachable!("a request is only enqueued after first assignment"));
        self.workers[worker_id].push(request);
    }

    fn shutdown(&self) {
        for worker in &self.workers {
            worker.shutdown.store(true, AtomicOrdering::Release);
            let _guard = worker.queue.lock().expect(ERR_POISONED_LOCK);
            worker.cv.notify_all();
        }
        let mut handles = self.dispatch_threads.lock().expect(ERR_POISONED_LOCK);
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPoolInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(worker: &Arc<WorkerState>, stack_size: Option<usize>) {
    while let Some(request) = worker.pop_blocking() {
        request.control().queued.store(false, AtomicOrdering::Release);
        if !request.control().thread_started.swap(true, AtomicOrdering::AcqRel) {
            spawn_request_thread(&request, stack_size);
        }
        let done = request.control().gate.run_until_yield_or_done();
        if done {
            worker.load.fetch_sub(1, AtomicOrdering::AcqRel);
            debug!(target: "ravel::worker_pool", request_id = request.control().id, "request completed");
        } else {
            trace!(target: "ravel::worker_pool", request_id = request.control().id, "request suspended");
        }
    }
}

fn spawn_request_thread(request: &Arc<dyn AnyRequest>, stack_size: Option<usize>) {
    let for_thread = Arc::clone(request);
    let name = format!("ravel-request-{}", request.control().id);
    let mut builder = thread::Builder::new().name(name);
    if let Some(size) = stack_size {
        builder = builder.stack_size(size);
    }
    let spawned = builder.spawn(move || {
        current::set_base(Arc::clone(&for_thread));
        current::push(Arc::clone(&for_thread));
        for_thread.control().gate.wait_for_turn();
        for_thread.execute();
        current::pop();
    });
    if let Err(err) = spawned {
        warn!(target: "ravel::worker_pool", error = %err, "failed to spawn request thread");
        request.control().complete(crate::request::control::Outcome::Failed(
            crate::Error::internal(format!("failed to spawn request thread: {err}")),
        ));
        request.control().gate.finish();
    }
}

/// The public handle for constructing and resetting worker pools.
///
/// The pool is process-wide and singleton: use [`WorkerPool::global`] to
/// fetch the current instance, or [`WorkerPool::reset_global`] to replace
/// it (only safe at startup — this invalidates any in-flight requests
/// assigned to the pool it replaces).
#[derive(Debug, Clone)]
pub struct WorkerPool {
    pub(crate) inner: PoolHandle,
}

static GLOBAL_POOL: OnceLock<RwLock<PoolHandle>> = OnceLock::new();

impl WorkerPool {
    /// Builds (but does not install as global) a new worker pool.
    #[must_use]
    pub fn new(config: WorkerPoolConfig) -> Self {
        let inner = Arc::new(WorkerPoolInner::new(config));
        inner.start();
        Self { inner }
    }

    /// Returns the current process-wide pool, creating a default one (sized
    /// to [`std::thread::available_parallelism`]) on first use.
    #[must_use]
    pub fn global() -> Self {
        let lock = GLOBAL_POOL.get_or_init(|| RwLock::new(Self::new(WorkerPoolConfig::default()).inner));
        Self {
            inner: Arc::clone(&lock.read().expect(ERR_POISONED_LOCK)),
        }
    }

    /// Replaces the process-wide pool with a freshly constructed one built
    /// from `config`. `worker_count == 0` selects debug (synchronous) mode.
    ///
    /// Any requests already assigned to the previous global pool are
    /// unaffected (they keep running against it) but new code calling
    /// [`WorkerPool::global`] will observe the replacement.
    pub fn reset_global(config: WorkerPoolConfig) -> Self {
        let pool = Self::new(config);
        let lock = GLOBAL_POOL.get_or_init(|| RwLock::new(Arc::clone(&pool.inner)));
        *lock.write().expect(ERR_POISONED_LOCK) = Arc::clone(&pool.inner);
        pool
    }

    #[must_use]
    pub(crate) fn handle(&self) -> PoolHandle {
        Arc::clone(&self.inner)
    }
}
