pub mod connector;
pub mod framer;
pub mod mock;
pub mod serial;
pub mod types;

// Re-export the main types that users need
pub use connector::{LinkConnector, LinkHandle};
pub use framer::{LineDecoder, LineFramer};
pub use mock::MockOpener;
pub use serial::SerialPortOpener;
pub use types::{LinkConfig, LinkError, LinkEvent, LinkIo, LinkState, PortOpener};
