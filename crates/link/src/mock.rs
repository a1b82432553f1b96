//! In-memory mock device for development without hardware.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::types::{LinkError, LinkIo, PortOpener};

const MOCK_PORT_BUFFER: usize = 1024;

/// Opens an in-memory port driven by a simulated device.
///
/// The device emits one numeric reading per period and logs any command
/// bytes written to it. Selected with `--mock`.
pub struct MockOpener {
    period: Duration,
}

impl MockOpener {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl Default for MockOpener {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl PortOpener for MockOpener {
    async fn open(&self) -> Result<Box<dyn LinkIo>, LinkError> {
        let (port, device) = tokio::io::duplex(MOCK_PORT_BUFFER);
        tokio::spawn(run_device(device, self.period));
        info!("mock serial device attached");
        Ok(Box::new(port))
    }
}

/// The simulated device: periodic readings out, command logging in.
async fn run_device(device: DuplexStream, period: Duration) {
    let (mut read_half, mut write_half) = tokio::io::split(device);
    let mut ticker = tokio::time::interval(period);
    let mut reading: u32 = 0;
    let mut cmd_buf = [0u8; 64];

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reading = (reading + 7) % 1024;
                let line = format!("{reading}\n");
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
            n = read_half.read(&mut cmd_buf) => match n {
                Ok(0) | Err(_) => break,
                Ok(n) => debug!(
                    "mock device received command: {:?}",
                    String::from_utf8_lossy(&cmd_buf[..n])
                ),
            },
        }
    }
    debug!("mock device detached");
}
