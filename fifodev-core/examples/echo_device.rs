//! Echo device example.
//!
//! A writer thread feeds a single-buffer device through the deferred path
//! while a reader thread drains it with blocking reads.

use fifodev_core::{AccessPath, DeviceConfig, DeviceSpec, OpenMode, RuntimeMode, Subsystem, SubsystemConfig};
use std::thread;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let subsystem = Subsystem::init(SubsystemConfig {
        runtime: RuntimeMode::select_for_system(),
        device: DeviceConfig {
            access: AccessPath::Deferred,
            mover: None,
            ..DeviceConfig::default()
        },
        devices: vec![DeviceSpec {
            capacity: 16,
            paired: false,
        }],
    })?;

    let id = subsystem.device_ids()[0];
    let writer = subsystem.open(id, OpenMode::WriteOnly, false)?;
    let mut reader = subsystem.open(id, OpenMode::ReadOnly, false)?;
    reader.set_timeout(Some(Duration::from_secs(1)));

    let producer = thread::spawn(move || -> anyhow::Result<()> {
        for i in 0..5 {
            let message = format!("message {}\n", i);
            let written = writer.write_all(message.as_bytes(), Duration::from_millis(10))?;
            println!("Writer: wrote {} bytes", written);
            thread::sleep(Duration::from_millis(100));
        }
        Ok(())
    });

    let consumer = thread::spawn(move || -> anyhow::Result<String> {
        let mut received = Vec::new();
        while received.iter().filter(|b| **b == b'\n').count() < 5 {
            let chunk = reader.read(8)?;
            println!("Reader: got {:?}", String::from_utf8_lossy(&chunk));
            received.extend(chunk);
        }
        Ok(String::from_utf8_lossy(&received).into_owned())
    });

    producer
        .join()
        .map_err(|_| anyhow::anyhow!("writer thread panicked"))??;
    let text = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("reader thread panicked"))??;

    println!("Received:\n{}", text);
    subsystem.shutdown();
    Ok(())
}
