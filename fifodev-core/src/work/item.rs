//! Work items executed by a [`WorkScheduler`](super::WorkScheduler).
//!
//! A work item is shared between the caller that created it and the worker
//! that runs it. Its result is written exactly once, either by the worker
//! after the copy or by whoever cancels it first, and the target buffer's
//! notifier is signalled afterwards.

use crate::error::{DeviceError, Result};
use crate::notify::WaitOutcome;
use crate::ring::{self, CircularBuffer};

use crossbeam_utils::Backoff;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a work item.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Waiting in the queue.
    Queued = 0,

    /// Picked up by the worker; the copy is in progress.
    Running = 1,

    /// The copy finished and the result is available.
    Complete = 2,

    /// Withdrawn before it started; nothing was transferred.
    Cancelled = 3,
}

impl WorkStatus {
    fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Complete,
            _ => Self::Cancelled,
        }
    }
}

/// What a work item does.
pub enum TransferKind {
    /// Move up to `max` bytes out of the buffer to the caller.
    Drain { max: usize },

    /// Push caller bytes into the buffer.
    Fill { data: Vec<u8> },

    /// Move up to `max` bytes from the buffer into `destination`.
    Transfer {
        destination: Arc<CircularBuffer>,
        max: usize,
    },
}

impl TransferKind {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Drain { .. } => "drain",
            Self::Fill { .. } => "fill",
            Self::Transfer { .. } => "transfer",
        }
    }
}

impl fmt::Debug for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drain { max } => write!(f, "Drain({})", max),
            Self::Fill { data } => write!(f, "Fill({})", data.len()),
            Self::Transfer { destination, max } => {
                write!(f, "Transfer(to={}, max={})", destination.id(), max)
            }
        }
    }
}

/// Result of a settled work item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Bytes actually transferred.
    pub transferred: usize,

    /// Bytes drained (only for [`TransferKind::Drain`]).
    pub data: Vec<u8>,

    /// Whether the item was cancelled instead of run.
    pub cancelled: bool,
}

impl Completion {
    fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }
}

/// A deferred copy against a circular buffer.
pub struct WorkItem {
    id: u64,
    kind: TransferKind,
    buffer: Arc<CircularBuffer>,
    status: AtomicU32,
    result: OnceLock<Completion>,
}

impl WorkItem {
    fn new(buffer: Arc<CircularBuffer>, kind: TransferKind) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            buffer,
            status: AtomicU32::new(WorkStatus::Queued as u32),
            result: OnceLock::new(),
        })
    }

    /// Creates an item that drains up to `max` bytes from `buffer`.
    pub fn drain(buffer: Arc<CircularBuffer>, max: usize) -> Arc<Self> {
        Self::new(buffer, TransferKind::Drain { max })
    }

    /// Creates an item that pushes `data` into `buffer`.
    pub fn fill(buffer: Arc<CircularBuffer>, data: Vec<u8>) -> Arc<Self> {
        Self::new(buffer, TransferKind::Fill { data })
    }

    /// Creates an item that moves up to `max` bytes from `source` to `destination`.
    pub fn transfer(
        source: Arc<CircularBuffer>,
        destination: Arc<CircularBuffer>,
        max: usize,
    ) -> Arc<Self> {
        Self::new(source, TransferKind::Transfer { destination, max })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &TransferKind {
        &self.kind
    }

    /// The buffer this item operates on (the source for transfers).
    pub fn buffer(&self) -> &Arc<CircularBuffer> {
        &self.buffer
    }

    pub fn status(&self) -> WorkStatus {
        WorkStatus::from_u32(self.status.load(Ordering::Acquire))
    }

    /// Returns the result once the item has completed or been cancelled.
    pub fn completion(&self) -> Option<&Completion> {
        self.result.get()
    }

    /// Returns true once a result is available.
    pub fn is_settled(&self) -> bool {
        self.result.get().is_some()
    }

    /// Claims the item for execution. Fails if it was cancelled first.
    pub(crate) fn begin(&self) -> bool {
        self.status
            .compare_exchange(
                WorkStatus::Queued as u32,
                WorkStatus::Running as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Performs the copy. Must only be called after a successful [`begin`](Self::begin).
    pub(crate) fn execute(&self) {
        debug_assert_eq!(self.status(), WorkStatus::Running);

        let completion = match &self.kind {
            TransferKind::Drain { max } => {
                let data = self.buffer.pop(*max);
                Completion {
                    transferred: data.len(),
                    data,
                    cancelled: false,
                }
            }
            TransferKind::Fill { data } => Completion {
                transferred: self.buffer.push(data),
                ..Completion::default()
            },
            TransferKind::Transfer { destination, max } => {
                let outcome = ring::transfer(&self.buffer, destination, Some(*max), None);
                Completion {
                    transferred: outcome.moved,
                    ..Completion::default()
                }
            }
        };

        tracing::trace!(
            item = self.id,
            kind = self.kind.name(),
            transferred = completion.transferred,
            "work item complete"
        );
        self.settle(completion, WorkStatus::Complete);
    }

    /// Withdraws the item if it has not started.
    ///
    /// Returns true if this call cancelled it. A cancelled item settles with
    /// zero bytes transferred.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .status
            .compare_exchange(
                WorkStatus::Queued as u32,
                WorkStatus::Cancelled as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if cancelled {
            tracing::trace!(item = self.id, kind = self.kind.name(), "work item cancelled");
            self.settle(Completion::cancelled(), WorkStatus::Cancelled);
        }
        cancelled
    }

    fn settle(&self, completion: Completion, status: WorkStatus) {
        if self.result.set(completion).is_err() {
            tracing::warn!(item = self.id, "work item settled twice");
            return;
        }
        self.status.store(status as u32, Ordering::Release);
        self.buffer.notifier().signal_all();
    }

    /// Blocks until the item settles.
    ///
    /// If the wait times out or is cancelled before the worker picked the
    /// item up, the item is withdrawn and the corresponding error returned.
    /// If the worker already started, the copy is allowed to finish and its
    /// result is returned, so bytes are never taken without being reported.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Completion> {
        let outcome = self
            .buffer
            .notifier()
            .wait_until(|| self.is_settled(), timeout);

        if outcome != WaitOutcome::Ready && self.cancel() {
            return Err(match outcome {
                WaitOutcome::TimedOut => DeviceError::TimedOut,
                _ => DeviceError::Cancelled,
            });
        }

        // Either settled already or running; a running copy never blocks.
        let backoff = Backoff::new();
        loop {
            if let Some(completion) = self.completion() {
                if completion.cancelled {
                    return Err(DeviceError::Cancelled);
                }
                return Ok(completion.clone());
            }
            backoff.snooze();
        }
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("buffer", &self.buffer.id())
            .field("status", &self.status())
            .finish()
    }
}
