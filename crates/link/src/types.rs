//! Common types and traits for the serial link layer

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Configuration for the serial link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Device path of the serial port
    #[serde(default = "default_path")]
    pub path: String,
    /// Baud rate for the port
    #[serde(default = "default_baud")]
    pub baud: u32,
}

fn default_path() -> String {
    "/dev/cu.usbserial-1120".to_string()
}

fn default_baud() -> u32 {
    115_200
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            baud: default_baud(),
        }
    }
}

/// Connection state of the link, published by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// No connection; a retry may be pending.
    Disconnected,
    /// An open attempt is in progress.
    Connecting,
    /// The port is open and framing.
    Open,
}

/// Events emitted by the connector for the rest of the system.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The port was opened and framing started.
    Connected,
    /// One newline-delimited line read from the device, trimmed.
    Frame(String),
    /// The port closed or failed; a reconnect is scheduled.
    Disconnected,
}

/// Errors that can occur in the link layer.
#[derive(Error, Debug)]
pub enum LinkError {
    /// There is no open connection to write to.
    #[error("serial port not connected")]
    NotConnected,
    /// Opening the port failed.
    #[error("failed to open serial port {path}: {message}")]
    OpenFailed { path: String, message: String },
    /// I/O failure on an open port.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The connector task is no longer running.
    #[error("link connector is gone")]
    ConnectorGone,
}

/// Byte stream of an open port.
pub trait LinkIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkIo for T {}

/// How a port is opened. Implemented by the real serial port and by mocks.
#[async_trait::async_trait]
pub trait PortOpener: Send + Sync {
    /// Attempt to open the port, yielding its byte stream.
    async fn open(&self) -> Result<Box<dyn LinkIo>, LinkError>;
}
