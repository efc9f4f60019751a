//! Buffer-to-buffer transfer.
//!
//! Both guards are held for the whole move, so a byte is always either still
//! in the source or already in the destination. Guards are taken in
//! increasing [`BufferId`](crate::ring::BufferId) order, which every
//! multi-buffer operation in this crate follows.

use crate::ring::buffer::CircularBuffer;

/// Result of a single transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Bytes moved from source to destination.
    pub moved: usize,
    /// Whether a filler byte was written because the source was empty.
    pub filler_injected: bool,
}

impl TransferOutcome {
    /// Returns true if either buffer changed.
    pub fn changed(&self) -> bool {
        self.moved > 0 || self.filler_injected
    }
}

/// Moves up to `limit` bytes (all that fit when `None`) from `source` to
/// `destination`.
///
/// When the source is empty and `filler` is set, one filler byte is pushed
/// into the destination instead. Never blocks. Both notifiers are signalled
/// after the guards are released.
pub fn transfer(
    source: &CircularBuffer,
    destination: &CircularBuffer,
    limit: Option<usize>,
    filler: Option<u8>,
) -> TransferOutcome {
    if source.id() == destination.id() || limit == Some(0) {
        return TransferOutcome::default();
    }

    // Scratch space sized for the largest possible move, allocated outside the guards.
    let max = source
        .capacity()
        .min(destination.capacity())
        .min(limit.unwrap_or(usize::MAX));
    let mut scratch = vec![0u8; max];

    let outcome = {
        let (mut src, mut dst) = if source.id() < destination.id() {
            let src = source.lock();
            let dst = destination.lock();
            (src, dst)
        } else {
            let dst = destination.lock();
            let src = source.lock();
            (src, dst)
        };

        let n = src.len().min(dst.free()).min(max);
        if n > 0 {
            let popped = src.pop_into(&mut scratch[..n]);
            let pushed = dst.push(&scratch[..popped]);
            debug_assert_eq!(popped, pushed);
            TransferOutcome {
                moved: pushed,
                filler_injected: false,
            }
        } else if src.len() == 0 {
            let injected = match filler {
                Some(byte) => dst.push(&[byte]) == 1,
                None => false,
            };
            TransferOutcome {
                moved: 0,
                filler_injected: injected,
            }
        } else {
            TransferOutcome::default()
        }
    };

    if outcome.moved > 0 {
        source.header().record_out(outcome.moved);
        destination.header().record_in(outcome.moved);
        source.notifier().signal_all();
        destination.notifier().signal_all();
    } else if outcome.filler_injected {
        destination.header().record_in(1);
        destination.notifier().signal_all();
    }

    outcome
}
