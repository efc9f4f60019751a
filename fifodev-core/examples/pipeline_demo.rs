//! Pipeline device example.
//!
//! Bytes written to the device land in its input buffer. A periodic mover
//! shifts them to the output buffer every 200ms, injecting a `#` when there
//! is nothing to move.

use fifodev_core::{
    AccessPath, DeviceConfig, DeviceSpec, MoverConfig, OpenMode, RuntimeMode, Subsystem,
    SubsystemConfig,
};
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let subsystem = Subsystem::init(SubsystemConfig {
        runtime: RuntimeMode::SingleThread,
        device: DeviceConfig {
            access: AccessPath::Direct,
            mover: Some(MoverConfig {
                period: Duration::from_millis(200),
                ..MoverConfig::default()
            }),
            ..DeviceConfig::default()
        },
        devices: vec![DeviceSpec {
            capacity: 64,
            paired: true,
        }],
    })?;

    let handle = subsystem.open(subsystem.device_ids()[0], OpenMode::ReadWrite, false)?;
    let written = handle.write(b"pipeline")?;
    println!("Wrote {} bytes to the input buffer", written);

    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(1) {
        let chunk = handle.read(64)?;
        println!(
            "[{:>4}ms] read {:?}",
            started.elapsed().as_millis(),
            String::from_utf8_lossy(&chunk)
        );
    }

    if let Some(mover) = handle.device().mover() {
        println!("Mover ran {} ticks", mover.ticks());
    }

    subsystem.shutdown();
    Ok(())
}
