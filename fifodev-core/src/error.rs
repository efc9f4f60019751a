//! Error types for device operations.
//!
//! Steady-state operations return [`Result`]. Conditions that are a normal
//! outcome (empty read, full buffer on a non-blocking write) are not errors:
//! they surface as zero-length results.

use crate::device::DeviceId;
use thiserror::Error;

/// Result alias used by buffer, scheduler and device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors produced by the buffer engine and the devices built on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Storage for a buffer could not be reserved.
    #[error("failed to allocate {capacity} bytes of buffer storage")]
    AllocationFailure {
        /// Requested capacity after rounding.
        capacity: usize,
    },

    /// The work queue for this direction is full.
    #[error("work queue is full, retry later")]
    QueueFull,

    /// The device or scheduler is shutting down and accepts no new work.
    #[error("device is shutting down")]
    ShuttingDown,

    /// A blocking wait was aborted by shutdown.
    #[error("operation cancelled")]
    Cancelled,

    /// A blocking wait ran out of time before anything happened.
    #[error("operation timed out")]
    TimedOut,

    /// An argument was outside the accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A pipeline-only operation was attempted on a single-buffer device.
    #[error("device {0} has no paired buffers")]
    NotPaired(DeviceId),

    /// The handle was opened in a mode that does not permit this operation.
    #[error("handle opened {opened:?} cannot {operation}")]
    WrongAccessMode {
        /// Mode the handle was opened with.
        opened: crate::device::OpenMode,
        /// Attempted operation.
        operation: &'static str,
    },

    /// No device is registered under this identifier.
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
}

impl DeviceError {
    /// Returns true for conditions the caller is expected to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueueFull | Self::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DeviceError::QueueFull.is_transient());
        assert!(DeviceError::TimedOut.is_transient());
        assert!(!DeviceError::Cancelled.is_transient());
        assert!(!DeviceError::AllocationFailure { capacity: 64 }.is_transient());
        assert!(!DeviceError::InvalidArgument("x".into()).is_transient());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            DeviceError::QueueFull.to_string(),
            "work queue is full, retry later"
        );
        assert_eq!(
            DeviceError::NotPaired(DeviceId(3)).to_string(),
            "device 3 has no paired buffers"
        );
    }
}
