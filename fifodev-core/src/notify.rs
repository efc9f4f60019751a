//! Readiness notification.
//!
//! A [`ReadinessNotifier`] lets blocking callers sleep until some predicate
//! over buffer state becomes true. Any component that changes buffer state
//! calls [`ReadinessNotifier::signal_all`] afterwards, outside of the
//! buffer guard. Waiters re-evaluate their predicate on every wakeup, so
//! spurious signals are harmless.
//!
//! Notifiers can forward to a parent. The subsystem uses this to let a single
//! caller wait on activity across many buffers at once.

use parking_lot::{Condvar, Mutex};
use std::ops::BitOr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of what a buffer or device can do right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// At least one byte can be read.
    pub readable: bool,
    /// At least one byte can be written.
    pub writable: bool,
}

impl Readiness {
    /// Neither readable nor writable.
    pub const NONE: Readiness = Readiness {
        readable: false,
        writable: false,
    };

    /// Returns true if either bit is set.
    pub fn is_ready(&self) -> bool {
        self.readable || self.writable
    }
}

impl BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness {
            readable: self.readable || rhs.readable,
            writable: self.writable || rhs.writable,
        }
    }
}

/// How a blocking wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The predicate became true.
    Ready,
    /// The timeout elapsed first.
    TimedOut,
    /// The notifier was cancelled (shutdown).
    Cancelled,
}

/// Wait/signal primitive for buffer readiness.
pub struct ReadinessNotifier {
    /// Bumped on every signal so waiters can tell a wakeup from a timeout.
    generation: Mutex<u64>,
    condvar: Condvar,
    cancelled: AtomicBool,
    parent: Option<Arc<ReadinessNotifier>>,
}

impl ReadinessNotifier {
    /// Creates a standalone notifier.
    pub fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            condvar: Condvar::new(),
            cancelled: AtomicBool::new(false),
            parent: None,
        }
    }

    /// Creates a notifier whose signals are forwarded to `parent`.
    pub fn with_parent(parent: Arc<ReadinessNotifier>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new()
        }
    }

    /// Wakes every waiter so it can re-check its predicate.
    pub fn signal_all(&self) {
        {
            let mut generation = self.generation.lock();
            *generation = generation.wrapping_add(1);
        }
        self.condvar.notify_all();

        if let Some(parent) = &self.parent {
            parent.signal_all();
        }
    }

    /// Blocks until `predicate` returns true, the timeout elapses, or the
    /// notifier is cancelled.
    ///
    /// The predicate runs with the notifier's internal lock held, which
    /// closes the window between checking and sleeping. It may take a buffer
    /// guard, but must not block, and must stay short: `signal_all` from a
    /// mover tick waits for the same lock.
    pub fn wait_until<F>(&self, mut predicate: F, timeout: Option<Duration>) -> WaitOutcome
    where
        F: FnMut() -> bool,
    {
        self.wait_with(|_| predicate(), timeout)
    }

    /// Number of signals seen so far.
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Blocks until a signal arrives after `seen` was read from
    /// [`generation`](Self::generation).
    ///
    /// Holds the internal lock only for a counter comparison, so callers can
    /// inspect arbitrary state between waits without delaying signallers.
    pub fn wait_for_signal(&self, seen: u64, timeout: Option<Duration>) -> WaitOutcome {
        self.wait_with(|generation| generation != seen, timeout)
    }

    fn wait_with<F>(&self, mut predicate: F, timeout: Option<Duration>) -> WaitOutcome
    where
        F: FnMut(u64) -> bool,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut generation = self.generation.lock();

        loop {
            if self.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            if predicate(*generation) {
                return WaitOutcome::Ready;
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    // A timeout result is re-checked against the predicate on the
                    // next iteration, so a late signal is never lost.
                    let _ = self.condvar.wait_until(&mut generation, deadline);
                }
                None => self.condvar.wait(&mut generation),
            }
        }
    }

    /// Cancels all current and future waits on this notifier.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!("readiness notifier cancelled");
        }
        self.signal_all();
    }

    /// Returns whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for ReadinessNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReadinessNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessNotifier")
            .field("cancelled", &self.is_cancelled())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
