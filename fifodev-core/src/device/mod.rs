//! Character-device style endpoints over circular buffers.
//!
//! A device is either an echo device (one buffer: what is written is read
//! back) or a pipeline device (writes fill the input buffer, reads drain the
//! output buffer, and bytes move from input to output either periodically
//! via a [`PeriodicMover`] or on demand via [`Device::control`]).
//!
//! Reads and writes either touch the buffer directly or go through one
//! [`WorkScheduler`] per direction, depending on [`AccessPath`].

mod handle;

pub use handle::{DeviceHandle, OpenMode};

use crate::error::{DeviceError, Result};
use crate::mover::{MoverConfig, PeriodicMover};
use crate::notify::{Readiness, WaitOutcome};
use crate::ring::{self, CircularBuffer, DEFAULT_BUFFER_SIZE};
use crate::work::{Direction, SchedulerConfig, WorkItem, WorkScheduler};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

/// Smallest accepted control command.
pub const CONTROL_MIN: u64 = 1;

/// Largest accepted control command.
pub const CONTROL_MAX: u64 = 100;

/// Device identifier, unique within a subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How reads and writes reach the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    /// The caller copies under the buffer guard itself.
    Direct,
    /// The copy is done by a per-direction worker.
    Deferred,
}

/// Whether a call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Wait for data or space, up to an optional timeout.
    Blocking { timeout: Option<Duration> },
    /// Return immediately with whatever can be done now.
    NonBlocking,
}

impl IoMode {
    /// Blocking without a timeout.
    pub const BLOCKING: IoMode = IoMode::Blocking { timeout: None };

    fn deadline(&self) -> Option<Instant> {
        match self {
            IoMode::Blocking { timeout: Some(t) } => Some(Instant::now() + *t),
            _ => None,
        }
    }

    fn is_blocking(&self) -> bool {
        matches!(self, IoMode::Blocking { .. })
    }
}

/// Configuration for a device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Buffer capacity in bytes. A device reports the capacity of its
    /// buffers here, rounded up to a power of two.
    pub capacity: usize,

    /// Access path for reads and writes.
    pub access: AccessPath,

    /// Work queue settings for the deferred path.
    pub scheduler: SchedulerConfig,

    /// Periodic mover settings for pipeline devices; `None` disables the mover.
    pub mover: Option<MoverConfig>,

    /// Fall back to a direct copy when the work queue is full.
    pub direct_fallback: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_SIZE,
            access: AccessPath::Direct,
            scheduler: SchedulerConfig::default(),
            mover: Some(MoverConfig::default()),
            direct_fallback: false,
        }
    }
}

/// The buffers behind a device.
#[derive(Debug, Clone)]
pub enum DeviceKind {
    /// Single buffer; reads return what writes stored.
    Echo { buffer: Arc<CircularBuffer> },

    /// Writes go to `input`, reads come from `output`.
    Pipeline {
        input: Arc<CircularBuffer>,
        output: Arc<CircularBuffer>,
    },
}

impl DeviceKind {
    /// Buffer drained by reads.
    pub fn read_buffer(&self) -> &Arc<CircularBuffer> {
        match self {
            Self::Echo { buffer } => buffer,
            Self::Pipeline { output, .. } => output,
        }
    }

    /// Buffer filled by writes.
    pub fn write_buffer(&self) -> &Arc<CircularBuffer> {
        match self {
            Self::Echo { buffer } => buffer,
            Self::Pipeline { input, .. } => input,
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, Self::Pipeline { .. })
    }

    /// All distinct buffers, in increasing id order.
    pub fn buffers(&self) -> Vec<&Arc<CircularBuffer>> {
        match self {
            Self::Echo { buffer } => vec![buffer],
            Self::Pipeline { input, output } => {
                if input.id() < output.id() {
                    vec![input, output]
                } else {
                    vec![output, input]
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Want {
    Data,
    Space,
}

/// A device exposing read, write, poll and control over its buffers.
pub struct Device {
    id: DeviceId,
    kind: DeviceKind,
    config: DeviceConfig,

    /// Deferred-path workers, one per direction.
    reader: Option<WorkScheduler>,
    writer: Option<WorkScheduler>,

    mover: Option<PeriodicMover>,

    shutting_down: AtomicBool,
}

impl Device {
    /// Creates an echo device over `buffer`.
    pub fn echo(
        id: DeviceId,
        buffer: Arc<CircularBuffer>,
        config: DeviceConfig,
        runtime: &Handle,
    ) -> Self {
        Self::build(id, DeviceKind::Echo { buffer }, config, runtime)
    }

    /// Creates a pipeline device moving bytes from `input` to `output`.
    pub fn pipeline(
        id: DeviceId,
        input: Arc<CircularBuffer>,
        output: Arc<CircularBuffer>,
        config: DeviceConfig,
        runtime: &Handle,
    ) -> Self {
        Self::build(id, DeviceKind::Pipeline { input, output }, config, runtime)
    }

    fn build(id: DeviceId, kind: DeviceKind, mut config: DeviceConfig, runtime: &Handle) -> Self {
        config.capacity = kind.write_buffer().capacity();

        let (reader, writer) = match config.access {
            AccessPath::Direct => (None, None),
            AccessPath::Deferred => (
                Some(WorkScheduler::start(
                    format!("rwq{:04}", id.0),
                    Direction::Read,
                    &config.scheduler,
                    runtime,
                )),
                Some(WorkScheduler::start(
                    format!("wwq{:04}", id.0),
                    Direction::Write,
                    &config.scheduler,
                    runtime,
                )),
            ),
        };

        let mover = match (&kind, &config.mover) {
            (DeviceKind::Pipeline { input, output }, Some(mover_config)) => Some(PeriodicMover::start(
                format!("mover{}", id.0),
                input.clone(),
                output.clone(),
                mover_config.clone(),
                runtime,
            )),
            _ => None,
        };

        let device = Self {
            id,
            kind,
            config,
            reader,
            writer,
            mover,
            shutting_down: AtomicBool::new(false),
        };
        device.dump("device-initialized");
        device
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_paired(&self) -> bool {
        self.kind.is_paired()
    }

    /// The periodic mover, for pipeline devices that run one.
    pub fn mover(&self) -> Option<&PeriodicMover> {
        self.mover.as_ref()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Opens a handle on this device.
    pub fn open(self: &Arc<Self>, mode: OpenMode, nonblocking: bool) -> Result<DeviceHandle> {
        if self.is_shutting_down() {
            return Err(DeviceError::ShuttingDown);
        }
        Ok(DeviceHandle::new(self.clone(), mode, nonblocking))
    }

    /// Reads up to `max_count` bytes.
    ///
    /// Returns fewer bytes than requested when fewer are stored. A zero-length
    /// request, or a non-blocking read of an empty buffer, returns nothing.
    pub fn read(&self, max_count: usize, mode: IoMode) -> Result<Vec<u8>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }
        if self.is_shutting_down() {
            return Err(DeviceError::ShuttingDown);
        }

        let buffer = self.kind.read_buffer();
        let deadline = mode.deadline();
        buffer.dump("read-start");

        let data = loop {
            let data = match &self.reader {
                Some(reader) => {
                    let count = max_count.min(buffer.available());
                    if count == 0 {
                        Vec::new()
                    } else {
                        self.read_deferred(reader, buffer, count, deadline)?
                    }
                }
                None => buffer.pop(max_count),
            };

            if !data.is_empty() || !mode.is_blocking() {
                break data;
            }
            self.wait_for(buffer, Want::Data, deadline)?;
        };

        buffer.dump("read-end");
        Ok(data)
    }

    fn read_deferred(
        &self,
        reader: &WorkScheduler,
        buffer: &Arc<CircularBuffer>,
        count: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<u8>> {
        let item = WorkItem::drain(buffer.clone(), count);
        match reader.enqueue(item.clone()) {
            Ok(()) => {}
            Err(DeviceError::QueueFull) if self.config.direct_fallback => {
                tracing::debug!(device = %self.id, "read queue full, copying directly");
                return Ok(buffer.pop(count));
            }
            Err(e) => return Err(e),
        }

        let completion = item.wait(remaining(deadline))?;
        Ok(completion.data)
    }

    /// Writes as much of `data` as fits, returns the count accepted.
    ///
    /// A zero-length write, or a non-blocking write to a full buffer, returns 0.
    pub fn write(&self, data: &[u8], mode: IoMode) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if self.is_shutting_down() {
            return Err(DeviceError::ShuttingDown);
        }

        let buffer = self.kind.write_buffer();
        let deadline = mode.deadline();
        buffer.dump("write-start");

        let written = loop {
            let written = match &self.writer {
                Some(writer) => {
                    let count = data.len().min(buffer.free());
                    if count == 0 {
                        0
                    } else {
                        self.write_deferred(writer, buffer, &data[..count], deadline)?
                    }
                }
                None => buffer.push(data),
            };

            if written > 0 || !mode.is_blocking() {
                break written;
            }
            self.wait_for(buffer, Want::Space, deadline)?;
        };

        buffer.dump("write-end");
        Ok(written)
    }

    fn write_deferred(
        &self,
        writer: &WorkScheduler,
        buffer: &Arc<CircularBuffer>,
        data: &[u8],
        deadline: Option<Instant>,
    ) -> Result<usize> {
        let item = WorkItem::fill(buffer.clone(), data.to_vec());
        match writer.enqueue(item.clone()) {
            Ok(()) => {}
            Err(DeviceError::QueueFull) if self.config.direct_fallback => {
                tracing::debug!(device = %self.id, "write queue full, copying directly");
                return Ok(buffer.push(data));
            }
            Err(e) => return Err(e),
        }

        let completion = item.wait(remaining(deadline))?;
        Ok(completion.transferred)
    }

    /// Readiness of the device: readable from the read buffer, writable from
    /// the write buffer. Never blocks.
    pub fn poll(&self) -> Readiness {
        match &self.kind {
            DeviceKind::Echo { buffer } => buffer.poll_state(),
            DeviceKind::Pipeline { input, output } => Readiness {
                readable: output.poll_state().readable,
                writable: input.poll_state().writable,
            },
        }
    }

    /// Moves up to `command` bytes from input to output right now.
    ///
    /// `command` must lie in `[1, 100]`. Returns the number of bytes moved.
    pub fn control(&self, command: u64) -> Result<usize> {
        if !(CONTROL_MIN..=CONTROL_MAX).contains(&command) {
            return Err(DeviceError::InvalidArgument(format!(
                "control command {} outside [{}, {}]",
                command, CONTROL_MIN, CONTROL_MAX
            )));
        }
        let (input, output) = match &self.kind {
            DeviceKind::Pipeline { input, output } => (input, output),
            DeviceKind::Echo { .. } => return Err(DeviceError::NotPaired(self.id)),
        };

        input.dump("control-start:in_buff");
        output.dump("control-start:out_buff");

        let outcome = ring::transfer(input, output, Some(command as usize), None);
        tracing::debug!(device = %self.id, command, moved = outcome.moved, "control transfer");

        input.dump("control-end:in_buff");
        output.dump("control-end:out_buff");
        Ok(outcome.moved)
    }

    /// Requests an input-to-output transfer from an asynchronous event source.
    ///
    /// With the deferred path the transfer is queued on the write worker and
    /// this returns without waiting; otherwise it runs immediately. The
    /// returned item settles once the transfer is done.
    pub fn raise_event(&self, max: usize) -> Result<Arc<WorkItem>> {
        let (input, output) = match &self.kind {
            DeviceKind::Pipeline { input, output } => (input, output),
            DeviceKind::Echo { .. } => return Err(DeviceError::NotPaired(self.id)),
        };
        if self.is_shutting_down() {
            return Err(DeviceError::ShuttingDown);
        }

        let item = WorkItem::transfer(input.clone(), output.clone(), max);
        match &self.writer {
            Some(writer) => writer.enqueue(item.clone())?,
            None => {
                if item.begin() {
                    item.execute();
                }
            }
        }
        Ok(item)
    }

    /// Logs every buffer of the device at debug level.
    pub fn dump(&self, label: &str) {
        for buffer in self.kind.buffers() {
            buffer.dump(&format!("{}:dev={}", label, self.id));
        }
    }

    /// Refuses new work and wakes every blocked caller of this device.
    pub fn stop_accepting(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(device = %self.id, "device stopping");

        for scheduler in [&self.reader, &self.writer].into_iter().flatten() {
            scheduler.stop_accepting();
        }
        for buffer in self.kind.buffers() {
            buffer.notifier().signal_all();
        }
    }

    /// Shuts the device down: stop accepting work, cancel queued work, then
    /// stop the mover. Buffers are left intact for the owner to release.
    pub async fn shutdown(&self) {
        self.stop_accepting();

        for scheduler in [&self.reader, &self.writer].into_iter().flatten() {
            scheduler.shutdown().await;
        }
        if let Some(mover) = &self.mover {
            mover.shutdown().await;
        }

        tracing::debug!(device = %self.id, "device stopped");
    }

    /// Waits until the buffer has data or space, honoring the deadline and
    /// shutdown. The buffer guard is never held while waiting.
    fn wait_for(&self, buffer: &CircularBuffer, want: Want, deadline: Option<Instant>) -> Result<()> {
        let outcome = buffer.notifier().wait_until(
            || {
                self.is_shutting_down()
                    || match want {
                        Want::Data => buffer.available() > 0,
                        Want::Space => buffer.free() > 0,
                    }
            },
            remaining(deadline),
        );

        match outcome {
            WaitOutcome::Ready if self.is_shutting_down() => Err(DeviceError::Cancelled),
            WaitOutcome::Ready => Ok(()),
            WaitOutcome::TimedOut => Err(DeviceError::TimedOut),
            WaitOutcome::Cancelled => Err(DeviceError::Cancelled),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("access", &self.config.access)
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tokio::runtime::Runtime;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn buffer(capacity: usize) -> Arc<CircularBuffer> {
        Arc::new(CircularBuffer::new(capacity).unwrap())
    }

    fn config(access: AccessPath) -> DeviceConfig {
        DeviceConfig {
            access,
            mover: None,
            ..DeviceConfig::default()
        }
    }

    fn echo(rt: &Runtime, access: AccessPath) -> Device {
        Device::echo(DeviceId(0), buffer(64), config(access), rt.handle())
    }

    fn pipeline(rt: &Runtime, access: AccessPath) -> Device {
        Device::pipeline(DeviceId(1), buffer(64), buffer(64), config(access), rt.handle())
    }

    #[test]
    fn test_write_truncates_then_reads_in_order() {
        let rt = runtime();
        for access in [AccessPath::Direct, AccessPath::Deferred] {
            let device = echo(&rt, access);
            let data: Vec<u8> = (0..70).collect();

            assert_eq!(device.write(&data, IoMode::NonBlocking).unwrap(), 64);
            assert_eq!(device.write(b"more", IoMode::NonBlocking).unwrap(), 0);
            assert_eq!(device.read(64, IoMode::NonBlocking).unwrap(), &data[..64]);

            rt.block_on(device.shutdown());
        }
    }

    #[test]
    fn test_zero_length_requests_return_immediately() {
        let rt = runtime();
        for access in [AccessPath::Direct, AccessPath::Deferred] {
            let device = echo(&rt, access);
            device.write(b"abc", IoMode::NonBlocking).unwrap();

            assert!(device.read(0, IoMode::BLOCKING).unwrap().is_empty());
            assert_eq!(device.write(&[], IoMode::BLOCKING).unwrap(), 0);
            assert_eq!(device.kind().read_buffer().available(), 3);

            rt.block_on(device.shutdown());
        }
    }

    #[test]
    fn test_nonblocking_read_on_empty_returns_nothing() {
        let rt = runtime();
        for access in [AccessPath::Direct, AccessPath::Deferred] {
            let device = echo(&rt, access);
            assert!(device.read(8, IoMode::NonBlocking).unwrap().is_empty());
            rt.block_on(device.shutdown());
        }
    }

    #[test]
    fn test_blocking_read_times_out() {
        let rt = runtime();
        let device = echo(&rt, AccessPath::Direct);
        let mode = IoMode::Blocking {
            timeout: Some(Duration::from_millis(30)),
        };
        assert_eq!(device.read(8, mode).unwrap_err(), DeviceError::TimedOut);
        rt.block_on(device.shutdown());
    }

    #[test]
    fn test_blocking_read_wakes_on_write() {
        let rt = runtime();
        for access in [AccessPath::Direct, AccessPath::Deferred] {
            let device = Arc::new(echo(&rt, access));

            let reader = {
                let device = device.clone();
                thread::spawn(move || device.read(16, IoMode::BLOCKING))
            };

            thread::sleep(Duration::from_millis(30));
            device.write(b"ping", IoMode::BLOCKING).unwrap();

            assert_eq!(reader.join().unwrap().unwrap(), b"ping");
            rt.block_on(device.shutdown());
        }
    }

    #[test]
    fn test_blocking_write_waits_for_space() {
        let rt = runtime();
        let device = Arc::new(Device::echo(
            DeviceId(2),
            buffer(4),
            config(AccessPath::Deferred),
            rt.handle(),
        ));
        device.write(b"abcd", IoMode::BLOCKING).unwrap();

        let writer = {
            let device = device.clone();
            thread::spawn(move || device.write(b"ef", IoMode::BLOCKING))
        };

        thread::sleep(Duration::from_millis(30));
        assert_eq!(device.read(2, IoMode::BLOCKING).unwrap(), b"ab");
        assert_eq!(writer.join().unwrap().unwrap(), 2);
        assert_eq!(device.read(8, IoMode::NonBlocking).unwrap(), b"cdef");

        rt.block_on(device.shutdown());
    }

    #[test]
    fn test_shutdown_cancels_blocked_reader() {
        let rt = runtime();
        let device = Arc::new(echo(&rt, AccessPath::Direct));

        let reader = {
            let device = device.clone();
            thread::spawn(move || device.read(16, IoMode::BLOCKING))
        };

        thread::sleep(Duration::from_millis(30));
        rt.block_on(device.shutdown());

        assert_eq!(reader.join().unwrap().unwrap_err(), DeviceError::Cancelled);
        assert_eq!(
            device.read(1, IoMode::NonBlocking).unwrap_err(),
            DeviceError::ShuttingDown
        );
    }

    #[test]
    fn test_poll_matches_following_operation() {
        let rt = runtime();
        for access in [AccessPath::Direct, AccessPath::Deferred] {
            let device = echo(&rt, access);

            let readiness = device.poll();
            assert!(!readiness.readable);
            assert!(readiness.writable);
            assert_eq!(device.write(b"x", IoMode::NonBlocking).unwrap(), 1);

            assert!(device.poll().readable);
            assert_eq!(device.read(1, IoMode::NonBlocking).unwrap(), b"x");

            rt.block_on(device.shutdown());
        }
    }

    #[test]
    fn test_pipeline_poll_uses_both_sides() {
        let rt = runtime();
        let device = pipeline(&rt, AccessPath::Direct);

        device.write(b"abc", IoMode::NonBlocking).unwrap();
        // Written bytes sit in the input buffer until moved.
        assert!(!device.poll().readable);
        assert!(device.read(8, IoMode::NonBlocking).unwrap().is_empty());

        assert_eq!(device.control(10).unwrap(), 3);
        assert!(device.poll().readable);
        assert_eq!(device.read(8, IoMode::NonBlocking).unwrap(), b"abc");

        rt.block_on(device.shutdown());
    }

    #[test]
    fn test_control_moves_at_most_available() {
        let rt = runtime();
        let device = pipeline(&rt, AccessPath::Direct);
        device.write(b"12345", IoMode::NonBlocking).unwrap();

        assert_eq!(device.control(10).unwrap(), 5);
        assert_eq!(device.control(10).unwrap(), 0);

        rt.block_on(device.shutdown());
    }

    #[test]
    fn test_control_rejects_out_of_range_and_unpaired() {
        let rt = runtime();
        let device = pipeline(&rt, AccessPath::Direct);
        assert!(matches!(
            device.control(0),
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(matches!(
            device.control(101),
            Err(DeviceError::InvalidArgument(_))
        ));

        let echo = echo(&rt, AccessPath::Direct);
        assert_eq!(echo.control(5).unwrap_err(), DeviceError::NotPaired(DeviceId(0)));

        rt.block_on(device.shutdown());
        rt.block_on(echo.shutdown());
    }

    #[test]
    fn test_raise_event_transfers_asynchronously() {
        let rt = runtime();
        for access in [AccessPath::Direct, AccessPath::Deferred] {
            let device = pipeline(&rt, access);
            device.write(b"event", IoMode::BLOCKING).unwrap();

            let item = device.raise_event(3).unwrap();
            let completion = item.wait(Some(Duration::from_secs(5))).unwrap();
            assert_eq!(completion.transferred, 3);
            assert_eq!(device.read(8, IoMode::NonBlocking).unwrap(), b"eve");

            rt.block_on(device.shutdown());
        }
    }

    #[test]
    fn test_concurrent_deferred_writers() {
        let rt = runtime();
        let device = Arc::new(echo(&rt, AccessPath::Deferred));

        let writers: Vec<_> = [b'a', b'b']
            .into_iter()
            .map(|byte| {
                let device = device.clone();
                thread::spawn(move || device.write(&[byte; 24], IoMode::BLOCKING).unwrap())
            })
            .collect();
        let accepted: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();

        let data = device.read(64, IoMode::NonBlocking).unwrap();
        assert_eq!(data.len(), accepted);
        assert_eq!(accepted, 48);
        // Each write lands as one contiguous run.
        let first = data[0];
        let split = data.iter().position(|b| *b != first).unwrap();
        assert_eq!(split, 24);
        assert!(data[split..].iter().all(|b| *b == data[split]));

        rt.block_on(device.shutdown());
    }

    #[test]
    fn test_queue_full_with_direct_fallback() {
        let rt = runtime();
        let device = Arc::new(Device::echo(
            DeviceId(3),
            buffer(64),
            DeviceConfig {
                access: AccessPath::Deferred,
                scheduler: SchedulerConfig {
                    queue_depth: 1,
                    work_delay: Duration::from_millis(100),
                },
                mover: None,
                direct_fallback: true,
                ..DeviceConfig::default()
            },
            rt.handle(),
        ));

        let writers: Vec<_> = (0..4u8)
            .map(|i| {
                let device = device.clone();
                thread::spawn(move || device.write(&[i; 4], IoMode::BLOCKING))
            })
            .collect();

        // With fallback enabled nobody sees QueueFull.
        let accepted: usize = writers.into_iter().map(|w| w.join().unwrap().unwrap()).sum();
        assert_eq!(accepted, 16);
        assert_eq!(device.kind().read_buffer().available(), 16);

        rt.block_on(device.shutdown());
    }
}
