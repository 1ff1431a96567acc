// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Error types surfaced by the scheduler.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong when submitting, waiting on, or
/// synchronizing around a [`crate::Request`].
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Raised by `wait`/`acquire` inside a request whose `cancelled` flag is
    /// set.
    #[error("the current request was cancelled")]
    Cancelled,

    /// `wait` observed that its target has already been cancelled, and the
    /// caller did not originate that cancellation.
    #[error("cannot wait on a request that has already been cancelled")]
    InvalidRequest,

    /// A request called `wait` on itself before it had finished.
    #[error("a request cannot wait on itself before it has finished")]
    CircularWait,

    /// A foreign-thread `wait` exceeded its timeout.
    #[error("wait timed out before the request completed")]
    Timeout,

    /// The scheduling machinery observed an inconsistency. Fatal to the
    /// affected request; propagated to all of its waiters.
    #[error("internal scheduler error: {0}")]
    Internal(String),

    /// An operation on a [`crate::RequestPool`] was invoked out of order.
    #[error("pool operation invoked after the pool was already submitted")]
    PoolStarted,

    /// The workload itself raised an error. Carried verbatim and rethrown to
    /// every waiter, including ones that wait long after the request
    /// finished, so the underlying error is reference-counted rather than
    /// owned.
    #[error("workload failed: {0}")]
    WorkloadFailure(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Builds an [`Error::Internal`] from a `Display`-able inconsistency.
    pub(crate) fn internal(msg: impl fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    /// Wraps an arbitrary workload error as [`Error::WorkloadFailure`], for
    /// workloads whose own fallible operations return a different error
    /// type than [`Error`] itself.
    #[must_use]
    pub fn workload_failure(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::WorkloadFailure(Arc::new(err))
    }
}
