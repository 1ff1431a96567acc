// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! Worker pool configuration.

/// Configuration for a [`crate::WorkerPool`].
///
/// `worker_count == 0` selects debug (synchronous) mode: no worker threads
/// are spawned, `submit` runs the workload on the caller's own stack, and
/// every request-aware primitive degrades to an ordinary blocking one.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub(crate) worker_count: usize,
    pub(crate) thread_name_prefix: String,
    pub(crate) stack_size: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism().map_or(1, std::num::NonZero::get),
            thread_name_prefix: "ravel-worker".to_owned(),
            stack_size: None,
        }
    }
}

impl WorkerPoolConfig {
    /// Starts building a configuration with `worker_count` workers.
    #[must_use]
    pub fn builder(worker_count: usize) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            config: Self {
                worker_count,
                ..Self::default()
            },
        }
    }

    /// Shorthand for debug (synchronous, `worker_count == 0`) mode.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            worker_count: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub(crate) fn is_debug(&self) -> bool {
        self.worker_count == 0
    }
}

/// Builder for [`WorkerPoolConfig`].
#[derive(Debug, Clone)]
pub struct WorkerPoolBuilder {
    config: WorkerPoolConfig,
}

impl WorkerPoolBuilder {
    /// Sets the prefix used when naming each worker's dispatch thread.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the stack size for worker dispatch threads and for each
    /// request's dedicated execution thread. `None` (the default) uses the
    /// platform default.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// Finishes building the configuration.
    #[must_use]
    pub fn build(self) -> WorkerPoolConfig {
        self.config
    }
}
