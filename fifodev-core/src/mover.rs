//! Periodic buffer-to-buffer mover.
//!
//! A mover wakes once per period and shifts bytes from its source buffer to
//! its destination buffer. A tick only ever takes the buffers' spinning
//! guards, so it never sleeps while touching buffer state. When the source is
//! empty the mover can inject a filler byte as a heartbeat.

use crate::ring::{self, CircularBuffer, TransferOutcome, DEFAULT_FILLER};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default mover period.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(5000);

/// Configuration for a periodic mover.
#[derive(Debug, Clone)]
pub struct MoverConfig {
    /// Time between ticks.
    pub period: Duration,

    /// Byte injected into the destination when the source is empty.
    pub filler: Option<u8>,

    /// Maximum bytes moved per tick; `None` moves all that fit.
    pub batch: Option<usize>,
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            filler: Some(DEFAULT_FILLER),
            batch: None,
        }
    }
}

/// Shared state between the mover handle and its task.
struct MoverShared {
    name: String,
    source: Arc<CircularBuffer>,
    destination: Arc<CircularBuffer>,
    config: MoverConfig,
    cancelled: AtomicBool,
    ticks: AtomicU64,
}

impl MoverShared {
    fn tick(&self) -> TransferOutcome {
        if self.cancelled.load(Ordering::Acquire) {
            return TransferOutcome::default();
        }

        self.source.dump("timer-start:in_buff");
        self.destination.dump("timer-start:out_buff");

        let outcome = ring::transfer(
            &self.source,
            &self.destination,
            self.config.batch,
            self.config.filler,
        );

        if outcome.moved > 0 {
            tracing::debug!(mover = %self.name, moved = outcome.moved, "mover moved bytes");
        } else if outcome.filler_injected {
            tracing::debug!(mover = %self.name, "nothing in input buffer, injected filler");
        } else {
            tracing::trace!(mover = %self.name, "mover tick had nothing to do");
        }

        self.source.dump("timer-end:in_buff");
        self.destination.dump("timer-end:out_buff");

        self.ticks.fetch_add(1, Ordering::Relaxed);
        outcome
    }
}

/// Background task moving bytes between two buffers on a fixed period.
pub struct PeriodicMover {
    shared: Arc<MoverShared>,
    cancel_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicMover {
    /// Starts a mover on `runtime`. The first tick fires one period from now.
    pub fn start(
        name: impl Into<String>,
        source: Arc<CircularBuffer>,
        destination: Arc<CircularBuffer>,
        config: MoverConfig,
        runtime: &Handle,
    ) -> Self {
        let shared = Arc::new(MoverShared {
            name: name.into(),
            source,
            destination,
            config,
            cancelled: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
        });
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = runtime.spawn(run_mover(shared.clone(), cancel_rx));
        tracing::debug!(
            mover = %shared.name,
            source = %shared.source.id(),
            destination = %shared.destination.id(),
            period_ms = shared.config.period.as_millis() as u64,
            "periodic mover started"
        );

        Self {
            shared,
            cancel_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &MoverConfig {
        &self.shared.config
    }

    /// Number of ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Runs one tick immediately, outside the schedule.
    pub fn tick_now(&self) -> TransferOutcome {
        self.shared.tick()
    }

    /// Stops the mover from rescheduling. A tick in progress completes.
    pub fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.cancel_tx.send(true);
        tracing::debug!(mover = %self.shared.name, "periodic mover cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the mover and waits for its task to exit.
    pub async fn shutdown(&self) {
        self.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(mover = %self.shared.name, "mover task failed: {}", e);
            }
        }
    }
}

impl Drop for PeriodicMover {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_mover(shared: Arc<MoverShared>, mut cancel: watch::Receiver<bool>) {
    let period = shared.config.period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = interval.tick() => {}
        }
        if shared.cancelled.load(Ordering::Acquire) {
            break;
        }
        shared.tick();
    }
}
