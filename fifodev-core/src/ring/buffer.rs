//! Circular byte buffer.
//!
//! This module implements a fixed-capacity FIFO byte store shared between
//! blocking callers, deferred workers and periodic movers. All ring state is
//! behind a spinning guard so that the buffer can be touched from contexts
//! that must never sleep. Callers that want to wait for data or space do so
//! through the buffer's [`ReadinessNotifier`], never while holding the guard.

use crate::error::{DeviceError, Result};
use crate::notify::{Readiness, ReadinessNotifier, WaitOutcome};
use crate::ring::header::{BufferHeader, BufferId, BufferStats};

use spin::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;

/// Guarded ring state.
///
/// Invariants: `storage.len()` is a power of two, `head` and `tail` are
/// always in `[0, capacity)` and `len <= capacity`.
pub(crate) struct RingState {
    storage: Box<[u8]>,
    head: usize,
    tail: usize,
    len: usize,
}

impl RingState {
    fn allocate(capacity: usize) -> Result<Self> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| DeviceError::AllocationFailure { capacity })?;
        storage.resize(capacity, 0);

        Ok(Self {
            storage: storage.into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.storage.len() - 1
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Copies as much of `data` as fits, returns the count copied.
    pub(crate) fn push(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free());
        if n == 0 {
            return 0;
        }

        let first = n.min(self.capacity() - self.tail);
        self.storage[self.tail..self.tail + first].copy_from_slice(&data[..first]);
        self.storage[..n - first].copy_from_slice(&data[first..n]);

        self.tail = (self.tail + n) & self.mask();
        self.len += n;
        n
    }

    /// Copies up to `out.len()` bytes from the head without consuming them.
    pub(crate) fn peek_into(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        if n == 0 {
            return 0;
        }

        let first = n.min(self.capacity() - self.head);
        out[..first].copy_from_slice(&self.storage[self.head..self.head + first]);
        out[first..n].copy_from_slice(&self.storage[..n - first]);
        n
    }

    /// Moves up to `out.len()` bytes from the head into `out`.
    pub(crate) fn pop_into(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek_into(out);
        self.head = (self.head + n) & self.mask();
        self.len -= n;
        n
    }
}

/// Fixed-capacity circular byte buffer.
pub struct CircularBuffer {
    header: BufferHeader,
    state: Mutex<RingState>,
    notifier: Arc<ReadinessNotifier>,
}

impl CircularBuffer {
    /// Creates a buffer with its own notifier.
    ///
    /// The capacity is rounded up to the next power of two; zero becomes one.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_notifier(capacity, Arc::new(ReadinessNotifier::new()))
    }

    /// Creates a buffer that signals through the given notifier.
    pub fn with_notifier(capacity: usize, notifier: Arc<ReadinessNotifier>) -> Result<Self> {
        let rounded = capacity
            .checked_next_power_of_two()
            .ok_or(DeviceError::AllocationFailure { capacity })?;
        if rounded != capacity {
            tracing::debug!(requested = capacity, rounded, "buffer capacity rounded up");
        }

        let state = RingState::allocate(rounded)?;
        let header = BufferHeader::new(rounded);
        tracing::trace!(id = %header.id, capacity = rounded, "buffer created");

        Ok(Self {
            header,
            state: Mutex::new(state),
            notifier,
        })
    }

    /// Returns the buffer identifier.
    pub fn id(&self) -> BufferId {
        self.header.id
    }

    /// Returns the capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.header.capacity
    }

    /// Returns the notifier signalled after every state change.
    pub fn notifier(&self) -> &Arc<ReadinessNotifier> {
        &self.notifier
    }

    /// Copies `min(data.len(), free())` bytes in. Never blocks.
    pub fn push(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let copied = self.state.lock().push(data);
        if copied > 0 {
            self.header.record_in(copied);
            self.notifier.signal_all();
        }
        copied
    }

    /// Removes up to `max_count` bytes from the head. Never blocks.
    pub fn pop(&self, max_count: usize) -> Vec<u8> {
        if max_count == 0 {
            return Vec::new();
        }

        // Allocate outside the guard.
        let mut out = vec![0u8; max_count.min(self.capacity())];
        let copied = self.pop_into(&mut out);
        out.truncate(copied);
        out
    }

    /// Removes up to `out.len()` bytes into `out`, returns the count copied.
    pub fn pop_into(&self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }

        let copied = self.state.lock().pop_into(out);
        if copied > 0 {
            self.header.record_out(copied);
            self.notifier.signal_all();
        }
        copied
    }

    /// Copies up to `max_count` bytes from the head without consuming them.
    pub fn peek(&self, max_count: usize) -> Vec<u8> {
        if max_count == 0 {
            return Vec::new();
        }

        let mut out = vec![0u8; max_count.min(self.capacity())];
        let copied = self.state.lock().peek_into(&mut out);
        out.truncate(copied);
        out
    }

    /// Number of bytes stored.
    pub fn available(&self) -> usize {
        self.state.lock().len()
    }

    /// Number of bytes that can still be pushed.
    pub fn free(&self) -> usize {
        self.state.lock().free()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Readiness snapshot taken under the guard.
    pub fn poll_state(&self) -> Readiness {
        let state = self.state.lock();
        Readiness {
            readable: state.len() > 0,
            writable: state.free() > 0,
        }
    }

    /// Blocks until at least one byte is stored.
    pub fn wait_readable(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.notifier.wait_until(|| self.available() > 0, timeout)
    }

    /// Blocks until at least one byte of space is free.
    pub fn wait_writable(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.notifier.wait_until(|| self.free() > 0, timeout)
    }

    /// Returns the traffic counters.
    pub fn stats(&self) -> BufferStats {
        self.header.stats()
    }

    /// Logs the buffer contents at debug level.
    pub fn dump(&self, label: &str) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }

        let mut contents = vec![0u8; self.capacity()];
        let len = {
            let state = self.state.lock();
            state.peek_into(&mut contents)
        };
        contents.truncate(len);

        tracing::debug!(
            "{}:buffer:id={}:size={}:contains={}:buf={}",
            label,
            self.id(),
            self.capacity(),
            len,
            String::from_utf8_lossy(&contents)
        );
    }

    /// Acquires the guard.
    ///
    /// Used by code that must operate on several buffers at once; such code
    /// is responsible for lock ordering and for signalling afterwards.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock()
    }

    pub(crate) fn header(&self) -> &BufferHeader {
        &self.header
    }
}

impl std::fmt::Debug for CircularBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularBuffer")
            .field("id", &self.id())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_buffer_creation() {
        let buffer = CircularBuffer::new(64).unwrap();
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.available(), 0);
        assert_eq!(buffer.free(), 64);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_capacity_rounds_up() {
        let buffer = CircularBuffer::new(100).unwrap();
        assert_eq!(buffer.capacity(), 128);

        let buffer = CircularBuffer::new(1).unwrap();
        assert_eq!(buffer.capacity(), 1);
    }

    #[test]
    fn test_zero_capacity_rounds_up_to_one() {
        let buffer = CircularBuffer::new(0).unwrap();
        assert_eq!(buffer.capacity(), 1);

        assert_eq!(buffer.push(b"xy"), 1);
        assert!(buffer.is_full());
        assert_eq!(buffer.push(b"z"), 0);
        assert_eq!(buffer.pop(4), b"x");
        assert!(buffer.is_empty());
        assert!(buffer.pop(4).is_empty());
    }

    #[test]
    fn test_push_truncates_to_free_space() {
        let buffer = CircularBuffer::new(64).unwrap();
        let data: Vec<u8> = (0..70).collect();

        assert_eq!(buffer.push(&data), 64);
        assert!(buffer.is_full());
        assert_eq!(buffer.push(b"x"), 0);

        let out = buffer.pop(64);
        assert_eq!(out, &data[..64]);
    }

    #[test]
    fn test_pop_bounded_by_available() {
        let buffer = CircularBuffer::new(16).unwrap();
        buffer.push(b"abc");

        assert_eq!(buffer.pop(10), b"abc");
        assert!(buffer.pop(10).is_empty());
    }

    #[test]
    fn test_fifo_across_wraparound() {
        let buffer = CircularBuffer::new(8).unwrap();

        // Move the cursors near the end of storage.
        assert_eq!(buffer.push(b"123456"), 6);
        assert_eq!(buffer.pop(5), b"12345");

        assert_eq!(buffer.push(b"abcdefg"), 7);
        assert_eq!(buffer.available(), 8);
        assert_eq!(buffer.pop(8), b"6abcdefg");
    }

    #[test]
    fn test_peek_does_not_consume() {
        let buffer = CircularBuffer::new(16).unwrap();
        buffer.push(b"hello");

        assert_eq!(buffer.peek(3), b"hel");
        assert_eq!(buffer.available(), 5);
        assert_eq!(buffer.pop(5), b"hello");
    }

    #[test]
    fn test_zero_length_requests() {
        let buffer = CircularBuffer::new(16).unwrap();
        assert_eq!(buffer.push(&[]), 0);
        assert!(buffer.pop(0).is_empty());
        assert_eq!(buffer.available(), 0);
        assert_eq!(buffer.stats().bytes_in, 0);
    }

    #[test]
    fn test_readiness_snapshot() {
        let buffer = CircularBuffer::new(2).unwrap();
        assert_eq!(
            buffer.poll_state(),
            Readiness { readable: false, writable: true }
        );

        buffer.push(b"ab");
        assert_eq!(
            buffer.poll_state(),
            Readiness { readable: true, writable: false }
        );
    }

    #[test]
    fn test_stats_track_traffic() {
        let buffer = CircularBuffer::new(16).unwrap();
        buffer.push(b"0123456789");
        buffer.pop(4);

        let stats = buffer.stats();
        assert_eq!(stats.bytes_in, 10);
        assert_eq!(stats.bytes_out, 4);
        assert_eq!(stats.id, buffer.id());
    }

    #[test]
    fn test_wait_readable_wakes_on_push() {
        let buffer = Arc::new(CircularBuffer::new(16).unwrap());

        let reader = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let outcome = buffer.wait_readable(Some(Duration::from_secs(5)));
                (outcome, buffer.pop(16))
            })
        };

        thread::sleep(Duration::from_millis(20));
        buffer.push(b"wake");

        let (outcome, data) = reader.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(data, b"wake");
    }

    #[test]
    fn test_concurrent_push_pop_conserves_bytes() {
        let buffer = Arc::new(CircularBuffer::new(64).unwrap());
        let per_writer = 2_000;
        let writers = 4;

        let producers: Vec<_> = (0..writers)
            .map(|w| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    let mut sent = 0;
                    while sent < per_writer {
                        let byte = [w as u8];
                        if buffer.push(&byte) == 1 {
                            sent += 1;
                        } else {
                            thread::yield_now();
                        }
                        assert!(buffer.available() <= buffer.capacity());
                    }
                })
            })
            .collect();

        let consumer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut counts = [0usize; 4];
                let mut total = 0;
                while total < per_writer * writers {
                    let chunk = buffer.pop(7);
                    if chunk.is_empty() {
                        thread::yield_now();
                    }
                    for byte in &chunk {
                        counts[*byte as usize] += 1;
                    }
                    total += chunk.len();
                }
                counts
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        let counts = consumer.join().unwrap();

        assert_eq!(counts, [per_writer; 4]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_random_chunks_preserve_order() {
        use rand::Rng;

        let buffer = CircularBuffer::new(32).unwrap();
        let mut rng = rand::thread_rng();
        let mut expected = std::collections::VecDeque::new();
        let mut next = 0u8;

        for _ in 0..500 {
            let chunk: Vec<u8> = (0..rng.gen_range(0..40))
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            let accepted = buffer.push(&chunk);
            assert_eq!(accepted, chunk.len().min(32 - expected.len()));
            expected.extend(&chunk[..accepted]);

            let taken = buffer.pop(rng.gen_range(0..40));
            let want: Vec<u8> = expected.drain(..taken.len()).collect();
            assert_eq!(taken, want);
            assert_eq!(buffer.available(), expected.len());
        }
    }
}
