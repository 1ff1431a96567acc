// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Lexicographically-ordered priority sequences.
//!
//! A [`Priority`] identifies a request's position in the tree of
//! parent/child relationships. Root requests get a single-element sequence
//! drawn from a process-wide counter; a child of parent `P`, created as `P`'s
//! `N`-th child, gets `P`'s sequence with `N` appended. Comparing two
//! sequences lexicographically therefore orders a parent strictly before any
//! of its children, and orders siblings by creation order.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use smallvec::SmallVec;

/// Most wait-call trees in practice nest a handful of levels deep; beyond
/// that this spills to the heap.
const INLINE_LEVELS: usize = 4;

/// A lexicographically-ordered sequence of integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Priority(SmallVec<[u32; INLINE_LEVELS]>);

impl Priority {
    /// Builds the priority for a new root request.
    pub(crate) fn root(counter: &AtomicU32) -> Self {
        let n = counter.fetch_add(1, AtomicOrdering::Relaxed);
        Self(SmallVec::from_slice(&[n]))
    }

    /// Builds the priority for the `child_index`-th child of `self`.
    pub(crate) fn child(&self, child_index: u32) -> Self {
        let mut seq = self.0.clone();
        seq.push(child_index);
        Self(seq)
    }

    /// The sequence as a slice, for diagnostics.
    #[must_use]
    pub fn levels(&self) -> &[u32] {
        &self.0
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Written out explicitly (rather than relying on the derived tuple-style
// comparison) because this ordering is the scheduler's correctness
// invariant, not an incidental convenience.
impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(other.0.iter())
            .find_map(|(a, b)| {
                let ord = a.cmp(b);
                (ord != Ordering::Equal).then_some(ord)
            })
            .unwrap_or_else(|| self.0.len().cmp(&other.0.len()))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut levels = self.0.iter();
        if let Some(first) = levels.next() {
            write!(f, "{first}")?;
            for level in levels {
                write!(f, ".{level}")?;
            }
        }
        Ok(())
    }
}
