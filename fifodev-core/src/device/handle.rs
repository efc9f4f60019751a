//! Open handles carrying an access mode and blocking behavior.

use super::{Device, IoMode};
use crate::error::{DeviceError, Result};
use crate::notify::Readiness;

use std::sync::Arc;
use std::time::Duration;

/// Access mode a handle was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenMode {
    pub fn can_read(&self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// An open handle on a device.
///
/// The handle carries the access mode and blocking behavior chosen at open
/// time, the way a file descriptor would.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    device: Arc<Device>,
    mode: OpenMode,
    nonblocking: bool,
    timeout: Option<Duration>,
}

impl DeviceHandle {
    pub(super) fn new(device: Arc<Device>, mode: OpenMode, nonblocking: bool) -> Self {
        tracing::trace!(device = %device.id(), ?mode, nonblocking, "device opened");
        Self {
            device,
            mode,
            nonblocking,
            timeout: None,
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.nonblocking = nonblocking;
    }

    /// Bounds every blocking call made through this handle.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn io_mode(&self) -> IoMode {
        if self.nonblocking {
            IoMode::NonBlocking
        } else {
            IoMode::Blocking {
                timeout: self.timeout,
            }
        }
    }

    fn require(&self, allowed: bool, operation: &'static str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(DeviceError::WrongAccessMode {
                opened: self.mode,
                operation,
            })
        }
    }

    pub fn read(&self, max_count: usize) -> Result<Vec<u8>> {
        self.require(self.mode.can_read(), "read")?;
        self.device.read(max_count, self.io_mode())
    }

    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.require(self.mode.can_write(), "write")?;
        self.device.write(data, self.io_mode())
    }

    /// Readiness restricted to the directions this handle may use.
    pub fn poll(&self) -> Readiness {
        let readiness = self.device.poll();
        Readiness {
            readable: readiness.readable && self.mode.can_read(),
            writable: readiness.writable && self.mode.can_write(),
        }
    }

    /// Issues a control command. Requires a readable handle.
    pub fn control(&self, command: u64) -> Result<usize> {
        self.require(self.mode.can_read(), "control")?;
        self.device.control(command)
    }

    /// Writes all of `data`, sleeping `backoff` whenever nothing was accepted
    /// or the queue reported a transient condition.
    ///
    /// On a permanent error the bytes already accepted stay in the device;
    /// their count is logged at debug level before the error is returned.
    pub fn write_all(&self, data: &[u8], backoff: Duration) -> Result<usize> {
        self.require(self.mode.can_write(), "write")?;

        let mut written = 0;
        while written < data.len() {
            match self.device.write(&data[written..], self.io_mode()) {
                Ok(0) => std::thread::sleep(backoff),
                Ok(n) => written += n,
                Err(e) if e.is_transient() => {
                    tracing::trace!(device = %self.device.id(), "write_all retrying: {}", e);
                    std::thread::sleep(backoff);
                }
                Err(e) => {
                    tracing::debug!(
                        device = %self.device.id(),
                        written,
                        total = data.len(),
                        "write_all stopped early: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AccessPath, DeviceConfig, DeviceId};
    use crate::ring::CircularBuffer;
    use tokio::runtime::Runtime;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn device(rt: &Runtime, capacity: usize) -> Arc<Device> {
        let config = DeviceConfig {
            access: AccessPath::Deferred,
            mover: None,
            ..DeviceConfig::default()
        };
        Arc::new(Device::echo(
            DeviceId(7),
            Arc::new(CircularBuffer::new(capacity).unwrap()),
            config,
            rt.handle(),
        ))
    }

    #[test]
    fn test_mode_is_enforced() {
        let rt = runtime();
        let device = device(&rt, 16);

        let reader = device.open(OpenMode::ReadOnly, true).unwrap();
        let writer = device.open(OpenMode::WriteOnly, true).unwrap();

        assert!(matches!(
            reader.write(b"x"),
            Err(DeviceError::WrongAccessMode { operation: "write", .. })
        ));
        assert!(matches!(
            writer.read(1),
            Err(DeviceError::WrongAccessMode { operation: "read", .. })
        ));
        assert!(matches!(
            writer.control(1),
            Err(DeviceError::WrongAccessMode { operation: "control", .. })
        ));

        assert_eq!(writer.write(b"x").unwrap(), 1);
        assert!(!writer.poll().readable);
        assert!(reader.poll().readable);
        assert_eq!(reader.read(4).unwrap(), b"x");

        rt.block_on(device.shutdown());
    }

    #[test]
    fn test_write_all_retries_until_drained() {
        let rt = runtime();
        let device = device(&rt, 8);
        let handle = device.open(OpenMode::ReadWrite, true).unwrap();

        let data: Vec<u8> = (0..32).collect();
        let drainer = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                let mut received = Vec::new();
                while received.len() < 32 {
                    received.extend(handle.read(8).unwrap());
                    std::thread::sleep(Duration::from_millis(1));
                }
                received
            })
        };

        assert_eq!(handle.write_all(&data, Duration::from_millis(2)).unwrap(), 32);
        assert_eq!(drainer.join().unwrap(), data);

        rt.block_on(device.shutdown());
    }

    #[test]
    fn test_write_all_keeps_partial_write_on_shutdown() {
        let rt = runtime();
        let device = device(&rt, 8);
        let handle = device.open(OpenMode::WriteOnly, true).unwrap();

        let writer = std::thread::spawn(move || {
            handle.write_all(&[b'z'; 32], Duration::from_millis(2))
        });

        std::thread::sleep(Duration::from_millis(50));
        rt.block_on(device.shutdown());

        assert_eq!(writer.join().unwrap().unwrap_err(), DeviceError::ShuttingDown);
        let buffer = device.kind().write_buffer();
        assert_eq!(buffer.available(), 8);
        assert_eq!(buffer.stats().bytes_in, 8);
    }

    #[test]
    fn test_open_after_shutdown_fails() {
        let rt = runtime();
        let device = device(&rt, 8);
        rt.block_on(device.shutdown());

        assert_eq!(
            device.open(OpenMode::ReadOnly, false).unwrap_err(),
            DeviceError::ShuttingDown
        );
    }

    #[test]
    fn test_handle_timeout_applies_to_blocking_read() {
        let rt = runtime();
        let device = device(&rt, 8);
        let mut handle = device.open(OpenMode::ReadOnly, false).unwrap();
        handle.set_timeout(Some(Duration::from_millis(20)));

        assert_eq!(handle.read(4).unwrap_err(), DeviceError::TimedOut);

        rt.block_on(device.shutdown());
    }
}
