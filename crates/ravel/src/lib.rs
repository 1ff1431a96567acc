// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! A cooperative scheduler for fine-grained, data-flow-shaped units of work.
//!
//! A [`Request`] is a deferred, cancellable, priority-ordered unit of work.
//! Requests submitted to a [`WorkerPool`] run across a fixed set of worker
//! threads; a request that needs to wait on another suspends cooperatively
//! (freeing its worker to run other requests) rather than blocking an OS
//! thread, via a lazily-spawned dedicated thread per started request and the
//! commandeer optimization for not-yet-started ones (see [`request`] for
//! details). [`RequestLock`] and [`RequestCondition`] extend the same
//! suspend-don't-block treatment to mutual exclusion and signalling, and
//! [`RequestPool`] batches many requests for fan-out/fan-in style workloads.
//!
//! Configuring a pool with `worker_count == 0` ([`WorkerPoolConfig::debug`])
//! runs every request synchronously on the submitting thread instead, with
//! no suspension machinery involved at all — useful for debugging a workload
//! without the added complexity of concurrent scheduling.

mod config;
mod constants;
mod current;
mod priority;
mod signal;

mod condition;
mod error;
mod lock;
mod pool;
mod request;
mod worker_pool;

pub use condition::{RequestCondition, RequestConditionGuard};
pub use config::{WorkerPoolBuilder, WorkerPoolConfig};
pub use current::{is_current_request_cancelled, raise_if_current_request_cancelled};
pub use error::{Error, Result};
pub use lock::{RequestLock, RequestLockGuard};
pub use pool::RequestPool;
pub use request::Request;
pub use worker_pool::WorkerPool;
