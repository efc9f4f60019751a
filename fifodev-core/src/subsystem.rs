//! Device subsystem: registry, runtime and teardown.
//!
//! A [`Subsystem`] owns the tokio runtime hosting all device workers and
//! movers, and a registry of devices keyed by [`DeviceId`]. Every buffer it
//! creates forwards readiness signals to one root notifier, which is what
//! [`Subsystem::poll_many`] sleeps on.

use crate::device::{Device, DeviceConfig, DeviceHandle, DeviceId, OpenMode};
use crate::error::{DeviceError, Result};
use crate::notify::{Readiness, ReadinessNotifier, WaitOutcome};
use crate::ring::{self, CircularBuffer, DEFAULT_BUFFER_SIZE};
use crate::runtime::RuntimeMode;

use anyhow::Context;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};

/// How long teardown waits for runtime tasks to finish.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// A device to create at init time.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// Buffer capacity in bytes.
    pub capacity: usize,
    /// Pipeline device (input and output buffers) rather than echo.
    pub paired: bool,
}

/// Configuration for the whole subsystem.
#[derive(Debug, Clone)]
pub struct SubsystemConfig {
    /// Thread layout of the owned runtime.
    pub runtime: RuntimeMode,

    /// Settings applied to every device; `capacity` is overridden per device.
    pub device: DeviceConfig,

    /// Devices created by [`Subsystem::init`].
    pub devices: Vec<DeviceSpec>,
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeMode::select_for_system(),
            device: DeviceConfig::default(),
            devices: vec![DeviceSpec {
                capacity: DEFAULT_BUFFER_SIZE,
                paired: false,
            }],
        }
    }
}

/// Owner of all devices and their runtime.
pub struct Subsystem {
    config: SubsystemConfig,
    runtime: Option<Runtime>,
    devices: DashMap<DeviceId, Arc<Device>>,
    activity: Arc<ReadinessNotifier>,
    next_id: AtomicU32,
}

impl Subsystem {
    /// Builds the runtime and creates the configured devices.
    ///
    /// If any device fails to initialize, everything created so far is torn
    /// down before the error is returned.
    pub fn init(config: SubsystemConfig) -> anyhow::Result<Self> {
        let runtime = config
            .runtime
            .build_runtime()
            .context("failed to start device subsystem")?;
        tracing::info!(mode = %config.runtime.description(), "device subsystem starting");

        let subsystem = Self {
            devices: DashMap::new(),
            activity: Arc::new(ReadinessNotifier::new()),
            next_id: AtomicU32::new(0),
            runtime: Some(runtime),
            config,
        };

        for spec in subsystem.config.devices.clone() {
            // Dropping `subsystem` on error runs the full teardown.
            subsystem
                .create_device(spec.capacity, spec.paired)
                .with_context(|| format!("failed to create initial device {:?}", spec))?;
        }

        tracing::info!(devices = subsystem.devices.len(), "device subsystem ready");
        Ok(subsystem)
    }

    pub fn config(&self) -> &SubsystemConfig {
        &self.config
    }

    /// Handle to the owned runtime.
    pub fn runtime_handle(&self) -> Result<Handle> {
        self.runtime
            .as_ref()
            .map(|rt| rt.handle().clone())
            .ok_or(DeviceError::ShuttingDown)
    }

    /// Creates a buffer whose signals reach [`poll_many`](Self::poll_many).
    pub fn create_buffer(&self, capacity: usize) -> Result<Arc<CircularBuffer>> {
        ring::create_buffer_under(capacity, &self.activity)
    }

    fn allocate_id(&self) -> DeviceId {
        DeviceId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn device_config(&self, capacity: usize) -> DeviceConfig {
        DeviceConfig {
            capacity,
            ..self.config.device.clone()
        }
    }

    /// Creates an echo device, or a pipeline device when `paired`.
    pub fn create_device(&self, capacity: usize, paired: bool) -> anyhow::Result<DeviceId> {
        let runtime = self.runtime_handle()?;
        let id = self.allocate_id();
        let config = self.device_config(capacity);

        let device = if paired {
            let input = self
                .create_buffer(config.capacity)
                .with_context(|| format!("failed to allocate input buffer for device {}", id))?;
            let output = self
                .create_buffer(config.capacity)
                .with_context(|| format!("failed to allocate output buffer for device {}", id))?;
            Device::pipeline(id, input, output, config, &runtime)
        } else {
            let buffer = self
                .create_buffer(config.capacity)
                .with_context(|| format!("failed to allocate buffer for device {}", id))?;
            Device::echo(id, buffer, config, &runtime)
        };

        tracing::debug!(device = %id, capacity, paired, "device created");
        self.devices.insert(id, Arc::new(device));
        Ok(id)
    }

    /// Creates an echo device over an existing buffer.
    ///
    /// Several devices may share one buffer; their operations serialize on the
    /// buffer guard.
    pub fn create_echo_on(&self, buffer: Arc<CircularBuffer>) -> Result<DeviceId> {
        let runtime = self.runtime_handle()?;
        let id = self.allocate_id();
        let config = self.device_config(buffer.capacity());

        let device = Device::echo(id, buffer, config, &runtime);
        tracing::debug!(device = %id, "echo device created on shared buffer");
        self.devices.insert(id, Arc::new(device));
        Ok(id)
    }

    pub fn device(&self, id: DeviceId) -> Result<Arc<Device>> {
        self.devices
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(DeviceError::UnknownDevice(id))
    }

    /// Registered device ids in increasing order.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// Opens a handle on a registered device.
    pub fn open(&self, id: DeviceId, mode: OpenMode, nonblocking: bool) -> Result<DeviceHandle> {
        self.device(id)?.open(mode, nonblocking)
    }

    /// Removes a device and shuts it down.
    ///
    /// Must not be called from inside the subsystem runtime.
    pub fn destroy_device(&self, id: DeviceId) -> Result<()> {
        let (_, device) = self
            .devices
            .remove(&id)
            .ok_or(DeviceError::UnknownDevice(id))?;

        let runtime = self.runtime.as_ref().ok_or(DeviceError::ShuttingDown)?;
        runtime.block_on(device.shutdown());
        tracing::debug!(device = %id, "device destroyed");
        Ok(())
    }

    /// Waits until at least one of `ids` is ready for a direction in `interest`.
    ///
    /// Returns the ready devices with their readiness masked by `interest`,
    /// or an empty list if the timeout elapsed first. Devices are scanned
    /// outside the root notifier's lock, so a busy scan never delays a
    /// mover tick signalling through it.
    pub fn poll_many(
        &self,
        ids: &[DeviceId],
        interest: Readiness,
        timeout: Option<Duration>,
    ) -> Result<Vec<(DeviceId, Readiness)>> {
        let devices = ids
            .iter()
            .map(|id| self.device(*id))
            .collect::<Result<Vec<_>>>()?;

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // Read the generation before scanning so a signal during the scan
            // ends the following wait at once.
            let seen = self.activity.generation();
            let ready: Vec<(DeviceId, Readiness)> = devices
                .iter()
                .map(|device| {
                    let readiness = device.poll();
                    let masked = Readiness {
                        readable: readiness.readable && interest.readable,
                        writable: readiness.writable && interest.writable,
                    };
                    (device.id(), masked)
                })
                .filter(|(_, readiness)| readiness.is_ready())
                .collect();
            if !ready.is_empty() {
                return Ok(ready);
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match self.activity.wait_for_signal(seen, remaining) {
                WaitOutcome::Ready => continue,
                WaitOutcome::TimedOut => return Ok(Vec::new()),
                WaitOutcome::Cancelled => return Err(DeviceError::Cancelled),
            }
        }
    }

    /// Tears the subsystem down.
    ///
    /// Stops all schedulers from accepting, cancels queued work and movers,
    /// wakes every blocked caller with a cancelled outcome and releases the
    /// buffers. Must not be called from inside the subsystem runtime.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        tracing::info!(devices = self.devices.len(), "device subsystem shutting down");

        let devices: Vec<Arc<Device>> = self
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for device in &devices {
            device.stop_accepting();
        }
        runtime.block_on(async {
            for device in &devices {
                device.shutdown().await;
            }
        });

        for device in &devices {
            for buffer in device.kind().buffers() {
                buffer.notifier().cancel();
            }
        }
        self.activity.cancel();

        self.devices.clear();
        runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
        tracing::info!("device subsystem stopped");
    }
}

impl Drop for Subsystem {
    fn drop(&mut self) {
        self.teardown();
    }
}
