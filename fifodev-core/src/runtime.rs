//! Runtime modes for the device subsystem
//!
//! The subsystem owns a tokio runtime that hosts work-scheduler workers and
//! periodic movers. Callers of blocking device operations run on their own
//! threads, never on the runtime's workers.

use anyhow::Context;
use std::fmt;
use tokio::runtime::{Builder, Runtime};

/// Thread name given to runtime workers.
pub const WORKER_THREAD_NAME: &str = "fifodev-worker";

/// Represents the thread layout of the subsystem runtime
#[derive(Clone, PartialEq, Eq)]
pub enum RuntimeMode {
    /// A single worker thread for all schedulers and movers
    SingleThread,

    /// Several worker threads sharing schedulers and movers
    MultiThread {
        /// Number of worker threads to create
        worker_count: usize,
    },
}

impl fmt::Debug for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleThread => write!(f, "SingleThread"),
            Self::MultiThread { worker_count } => {
                write!(f, "MultiThread(workers={})", worker_count)
            }
        }
    }
}

impl Default for RuntimeMode {
    fn default() -> Self {
        Self::select_for_system()
    }
}

impl RuntimeMode {
    /// Selects a runtime mode from the number of logical cores
    pub fn select_for_system() -> Self {
        Self::for_cores(num_cpus::get())
    }

    fn for_cores(logical_cores: usize) -> Self {
        if logical_cores <= 1 {
            return Self::SingleThread;
        }

        let worker_count = if logical_cores <= 4 {
            logical_cores
        } else {
            // Leave one core for blocking callers
            logical_cores - 1
        };

        Self::MultiThread { worker_count }
    }

    /// Returns the number of worker threads for this mode
    pub fn worker_count(&self) -> usize {
        match self {
            Self::SingleThread => 1,
            Self::MultiThread { worker_count } => (*worker_count).max(1),
        }
    }

    /// Returns a human-readable description of this mode
    pub fn description(&self) -> String {
        match self {
            Self::SingleThread => "Single-threaded mode".to_string(),
            Self::MultiThread { worker_count } => {
                format!("Multi-threaded mode with {} workers", worker_count)
            }
        }
    }

    /// Builds the tokio runtime for this mode.
    ///
    /// Even the single-threaded mode uses a multi-thread scheduler with one
    /// worker so that device tasks keep running while callers block.
    pub fn build_runtime(&self) -> anyhow::Result<Runtime> {
        Builder::new_multi_thread()
            .worker_threads(self.worker_count())
            .thread_name(WORKER_THREAD_NAME)
            .enable_all()
            .build()
            .with_context(|| format!("failed to build tokio runtime ({:?})", self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_runtime_mode() {
        assert!(matches!(RuntimeMode::for_cores(1), RuntimeMode::SingleThread));
        assert!(matches!(
            RuntimeMode::for_cores(2),
            RuntimeMode::MultiThread { worker_count: 2 }
        ));
        assert!(matches!(
            RuntimeMode::for_cores(8),
            RuntimeMode::MultiThread { worker_count: 7 }
        ));

        assert!(RuntimeMode::select_for_system().worker_count() >= 1);
    }

    #[test]
    fn test_runtime_mode_description() {
        assert!(RuntimeMode::SingleThread
            .description()
            .contains("Single-threaded"));

        let multi = RuntimeMode::MultiThread { worker_count: 4 };
        assert_eq!(multi.worker_count(), 4);
        assert!(multi.description().contains("4 workers"));
    }

    #[test]
    fn test_build_runtime_runs_tasks() {
        let runtime = RuntimeMode::SingleThread.build_runtime().unwrap();
        let value = runtime.block_on(async { tokio::spawn(async { 21 * 2 }).await.unwrap() });
        assert_eq!(value, 42);
    }
}
