//! Single-worker deferred execution queue.
//!
//! Each scheduler owns a bounded channel and exactly one worker task that
//! drains it in FIFO order, so at most one copy per direction is in flight.
//! Shutdown stops new submissions, lets an in-flight copy finish and cancels
//! everything still queued.

use crate::error::{DeviceError, Result};
use crate::work::item::WorkItem;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Direction served by a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Drains buffers towards callers.
    Read,
    /// Fills buffers from callers.
    Write,
}

/// Configuration for a work scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of queued items.
    pub queue_depth: usize,

    /// Delay applied before each copy, simulating a slow device.
    pub work_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_depth: 32,
            work_delay: Duration::ZERO,
        }
    }
}

/// A FIFO queue of [`WorkItem`]s served by one worker task.
pub struct WorkScheduler {
    /// Name used in logs.
    name: String,

    direction: Direction,

    /// Channel for submitting work items.
    tx: mpsc::Sender<Arc<WorkItem>>,

    accepting: AtomicBool,

    /// Flipped to `true` once on shutdown.
    shutdown_tx: watch::Sender<bool>,

    /// Worker task handle.
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkScheduler {
    /// Starts a scheduler whose worker runs on `runtime`.
    pub fn start(
        name: impl Into<String>,
        direction: Direction,
        config: &SchedulerConfig,
        runtime: &Handle,
    ) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker_handle = runtime.spawn(run_worker(
            name.clone(),
            rx,
            shutdown_rx,
            config.work_delay,
        ));
        tracing::debug!(scheduler = %name, ?direction, "work scheduler started");

        Self {
            name,
            direction,
            tx,
            accepting: AtomicBool::new(true),
            shutdown_tx,
            worker_handle: Mutex::new(Some(worker_handle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns whether new items are accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Number of items waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Submits an item without waiting.
    ///
    /// Fails with [`DeviceError::QueueFull`] when the queue is at capacity and
    /// with [`DeviceError::ShuttingDown`] once shutdown has begun.
    pub fn enqueue(&self, item: Arc<WorkItem>) -> Result<()> {
        if !self.is_accepting() {
            return Err(DeviceError::ShuttingDown);
        }

        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(item)) => {
                tracing::debug!(scheduler = %self.name, item = item.id(), "work queue full");
                Err(DeviceError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeviceError::ShuttingDown),
        }
    }

    /// Stops accepting new items. Queued items are still run.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Shuts the scheduler down and waits for the worker to exit.
    ///
    /// An item already being copied completes; items still queued are
    /// cancelled with zero bytes transferred. Calling this more than once is
    /// harmless.
    pub async fn shutdown(&self) {
        self.stop_accepting();
        let _ = self.shutdown_tx.send(true);

        let handle = self.worker_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(scheduler = %self.name, "worker task failed: {}", e);
            }
            tracing::debug!(scheduler = %self.name, "work scheduler stopped");
        }
    }
}

impl Drop for WorkScheduler {
    fn drop(&mut self) {
        // The worker cancels whatever is still queued.
        self.accepting.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);
    }
}

impl std::fmt::Debug for WorkScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkScheduler")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

async fn run_worker(
    name: String,
    mut rx: mpsc::Receiver<Arc<WorkItem>>,
    mut shutdown: watch::Receiver<bool>,
    delay: Duration,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        if !delay.is_zero() {
            let interrupted = tokio::select! {
                biased;
                _ = shutdown.changed() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if interrupted {
                item.cancel();
                break;
            }
        }

        if item.begin() {
            item.execute();
        } else {
            tracing::trace!(scheduler = %name, item = item.id(), "skipping withdrawn item");
        }
    }

    rx.close();
    let mut cancelled = 0usize;
    while let Some(item) = rx.recv().await {
        if item.cancel() {
            cancelled += 1;
        }
    }
    if cancelled > 0 {
        tracing::debug!(scheduler = %name, cancelled, "cancelled queued work items");
    }
}
