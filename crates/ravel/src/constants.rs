// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Small crate-internal constants shared across modules.

/// Message used whenever a `std::sync::Mutex`/`Condvar` guard is `.expect`ed.
/// A poisoned lock here means a prior panic happened while holding the lock,
/// which corrupts scheduler invariants beyond recovery for that pool.
pub(crate) const ERR_POISONED_LOCK: &str = "lock poisoned by a prior panic";
