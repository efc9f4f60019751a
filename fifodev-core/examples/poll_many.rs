//! Multi-device polling example.
//!
//! Several echo devices are written to at random by background threads while
//! the main thread waits for any of them to become readable.

use fifodev_core::{
    DeviceConfig, DeviceSpec, IoMode, Readiness, RuntimeMode, Subsystem, SubsystemConfig,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const DEVICES: usize = 4;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let subsystem = Arc::new(Subsystem::init(SubsystemConfig {
        runtime: RuntimeMode::select_for_system(),
        device: DeviceConfig {
            mover: None,
            ..DeviceConfig::default()
        },
        devices: vec![
            DeviceSpec {
                capacity: 32,
                paired: false,
            };
            DEVICES
        ],
    })?);
    let ids = subsystem.device_ids();

    let writers: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| -> anyhow::Result<_> {
            let device = subsystem.device(*id)?;
            Ok(thread::spawn(move || {
                thread::sleep(Duration::from_millis(150 * (i as u64 + 1)));
                let message = format!("from writer {}", i);
                device.write(message.as_bytes(), IoMode::NonBlocking)
            }))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let interest = Readiness {
        readable: true,
        writable: false,
    };
    let mut remaining = DEVICES;
    while remaining > 0 {
        let ready = subsystem.poll_many(&ids, interest, Some(Duration::from_secs(2)))?;
        if ready.is_empty() {
            println!("Timed out waiting for devices");
            break;
        }
        for (id, _) in ready {
            let data = subsystem.device(id)?.read(64, IoMode::NonBlocking)?;
            println!("Device {} readable: {:?}", id, String::from_utf8_lossy(&data));
            remaining -= 1;
        }
    }

    for writer in writers {
        writer
            .join()
            .map_err(|_| anyhow::anyhow!("writer thread panicked"))??;
    }

    match Arc::try_unwrap(subsystem) {
        Ok(subsystem) => subsystem.shutdown(),
        Err(_) => anyhow::bail!("subsystem still shared at exit"),
    }
    Ok(())
}
