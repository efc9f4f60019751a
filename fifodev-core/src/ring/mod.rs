//! Circular byte buffers.
//!
//! This module implements the fixed-capacity FIFO shared by every access
//! path of a device: direct blocking callers, deferred workers and periodic
//! movers.

mod buffer;
mod header;
mod transfer;

pub use buffer::CircularBuffer;
pub use header::{BufferHeader, BufferId, BufferStats};
pub use transfer::{transfer, TransferOutcome};

use crate::error::Result;
use crate::notify::ReadinessNotifier;
use std::sync::Arc;

/// Default capacity of a device buffer in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Byte injected by a mover when its source buffer is empty.
pub const DEFAULT_FILLER: u8 = b'#';

/// Creates a shared buffer with default settings.
pub fn create_buffer() -> Result<Arc<CircularBuffer>> {
    CircularBuffer::new(DEFAULT_BUFFER_SIZE).map(Arc::new)
}

/// Creates a shared buffer whose notifier forwards to `parent`.
pub fn create_buffer_under(
    capacity: usize,
    parent: &Arc<ReadinessNotifier>,
) -> Result<Arc<CircularBuffer>> {
    let notifier = Arc::new(ReadinessNotifier::with_parent(parent.clone()));
    CircularBuffer::with_notifier(capacity, notifier).map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::WaitOutcome;
    use std::time::Duration;

    #[test]
    fn test_create_buffer_defaults() {
        let buffer = create_buffer().unwrap();
        assert_eq!(buffer.capacity(), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_buffer_under_parent_signals_parent() {
        let parent = Arc::new(ReadinessNotifier::new());
        let buffer = create_buffer_under(16, &parent).unwrap();

        let waiter = {
            let parent = parent.clone();
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                parent.wait_until(|| buffer.available() > 0, Some(Duration::from_secs(5)))
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        buffer.push(b"x");
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Ready);
    }
}
