//! Control-command transfer example.
//!
//! With the periodic mover disabled, bytes only reach the output buffer when
//! a control command asks for them. Event-driven transfers go through the
//! deferred write queue.

use fifodev_core::{
    AccessPath, DeviceConfig, DeviceError, DeviceSpec, OpenMode, RuntimeMode, Subsystem,
    SubsystemConfig,
};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let subsystem = Subsystem::init(SubsystemConfig {
        runtime: RuntimeMode::SingleThread,
        device: DeviceConfig {
            access: AccessPath::Deferred,
            mover: None,
            ..DeviceConfig::default()
        },
        devices: vec![DeviceSpec {
            capacity: 64,
            paired: true,
        }],
    })?;

    let id = subsystem.device_ids()[0];
    let handle = subsystem.open(id, OpenMode::ReadWrite, true)?;
    handle.write(b"abcdefghijklmnop")?;

    for command in [3, 5] {
        let moved = handle.control(command)?;
        println!(
            "control({}) moved {} bytes, output now {:?}",
            command,
            moved,
            String::from_utf8_lossy(&handle.read(64)?)
        );
    }

    match handle.control(0) {
        Err(DeviceError::InvalidArgument(reason)) => println!("control(0) rejected: {}", reason),
        other => anyhow::bail!("unexpected control(0) result: {:?}", other),
    }

    let item = subsystem.device(id)?.raise_event(4)?;
    let completion = item.wait(Some(Duration::from_secs(1)))?;
    println!(
        "event moved {} bytes, output now {:?}",
        completion.transferred,
        String::from_utf8_lossy(&handle.read(64)?)
    );

    subsystem.shutdown();
    Ok(())
}
