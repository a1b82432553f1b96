//! Real serial port backend.

use async_trait::async_trait;
use tokio_serial::SerialPortBuilderExt;

use crate::types::{LinkConfig, LinkError, LinkIo, PortOpener};

/// Opens the configured serial device.
pub struct SerialPortOpener {
    config: LinkConfig,
}

impl SerialPortOpener {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PortOpener for SerialPortOpener {
    async fn open(&self) -> Result<Box<dyn LinkIo>, LinkError> {
        let stream = tokio_serial::new(self.config.path.as_str(), self.config.baud)
            .open_native_async()
            .map_err(|e| LinkError::OpenFailed {
                path: self.config.path.clone(),
                message: e.to_string(),
            })?;
        Ok(Box::new(stream))
    }
}
