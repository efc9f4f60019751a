//! Identity and counters for a circular buffer.
//!
//! The header lives next to the guarded ring state and holds everything
//! that can be read without taking the guard: the buffer's identifier,
//! its fixed capacity and monotonically increasing traffic counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Next identifier handed out to a new buffer.
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique buffer identifier.
///
/// Identifiers increase with creation order. Code that holds more than one
/// buffer guard at a time acquires them in increasing identifier order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u64);

impl BufferId {
    pub(crate) fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Buffer header.
#[derive(Debug)]
pub struct BufferHeader {
    /// Buffer identifier.
    pub id: BufferId,

    /// Capacity in bytes (a power of two).
    pub capacity: usize,

    /// Total bytes ever pushed into the buffer.
    pub bytes_in: AtomicUsize,

    /// Total bytes ever popped out of the buffer.
    pub bytes_out: AtomicUsize,

    /// Creation timestamp (seconds since epoch).
    pub created_at: AtomicU64,
}

impl BufferHeader {
    /// Creates a header for a buffer of the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            id: BufferId::next(),
            capacity,
            bytes_in: AtomicUsize::new(0),
            bytes_out: AtomicUsize::new(0),
            created_at: AtomicU64::new(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            ),
        }
    }

    /// Records bytes that entered the buffer.
    pub fn record_in(&self, n: usize) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    /// Records bytes that left the buffer.
    pub fn record_out(&self, n: usize) {
        self.bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            id: self.id,
            capacity: self.capacity,
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            created_at: self.created_at.load(Ordering::Relaxed),
        }
    }
}

/// Copy of a buffer's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub id: BufferId,
    pub capacity: usize,
    pub bytes_in: usize,
    pub bytes_out: usize,
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_creation() {
        let header = BufferHeader::new(64);
        let stats = header.stats();

        assert_eq!(stats.capacity, 64);
        assert_eq!(stats.bytes_in, 0);
        assert_eq!(stats.bytes_out, 0);
        assert!(stats.created_at > 0);
    }

    #[test]
    fn test_ids_increase() {
        let a = BufferHeader::new(8);
        let b = BufferHeader::new(8);
        assert!(a.id < b.id);
    }

    #[test]
    fn test_counters() {
        let header = BufferHeader::new(16);
        header.record_in(10);
        header.record_in(3);
        header.record_out(7);

        let stats = header.stats();
        assert_eq!(stats.bytes_in, 13);
        assert_eq!(stats.bytes_out, 7);
    }
}
