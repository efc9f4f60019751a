//! fifodev core - concurrent circular-buffer devices
//!
//! This library provides fixed-capacity byte FIFOs shared between blocking
//! readers and writers, per-direction deferred work queues, periodic
//! buffer-to-buffer movers and the device layer tying them together.

/// Error types
pub mod error;

/// Readiness wait/signal primitive
pub mod notify;

/// Circular byte buffers
pub mod ring;

/// Deferred work items and schedulers
pub mod work;

/// Periodic buffer-to-buffer mover
pub mod mover;

/// Devices and open handles
pub mod device;

/// Tokio runtime selection
pub mod runtime;

/// Device registry and lifecycle
pub mod subsystem;

pub use device::{AccessPath, Device, DeviceConfig, DeviceHandle, DeviceId, IoMode, OpenMode};
pub use error::{DeviceError, Result};
pub use mover::{MoverConfig, PeriodicMover};
pub use notify::{Readiness, ReadinessNotifier, WaitOutcome};
pub use ring::CircularBuffer;
pub use runtime::RuntimeMode;
pub use subsystem::{DeviceSpec, Subsystem, SubsystemConfig};
