//! Request/response transports used by instrument drivers.
//!
//! A [`Transport`] is the only thing a driver needs from the wire: `write` a command
//! that produces no answer, or `ask` a query and get back one trimmed response line.
//! Timeouts belong to the transport; drivers and the acquisition controller impose
//! none of their own.

use async_trait::async_trait;

pub mod mock_adapter;
pub use mock_adapter::MockAdapter;

pub mod prologix;
pub use prologix::PrologixAdapter;

pub mod serial_adapter;
pub use serial_adapter::SerialAdapter;

/// An error that can occur when talking to an instrument through a transport.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Adapter settings rejected before opening the port
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation attempted before `connect`
    #[error("Not connected")]
    NotConnected,

    /// Port could not be opened or the handshake failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Write to the instrument failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Write succeeded but no reply could be read
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No terminator arrived within the read timeout
    #[error("Read timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Underlying port I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport needs a cargo feature this build lacks
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

/// Line-oriented request/response channel to an instrument.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short human-readable description (port, address).
    fn info(&self) -> String;

    /// Open the underlying connection.
    async fn connect(&mut self) -> Result<(), AdapterError>;

    /// Close the underlying connection. Closing twice is not an error.
    async fn disconnect(&mut self) -> Result<(), AdapterError>;

    fn is_connected(&self) -> bool;

    /// Send a command that produces no response.
    async fn write(&mut self, command: &str) -> Result<(), AdapterError>;

    /// Send a query and return the (trimmed) response line.
    async fn ask(&mut self, query: &str) -> Result<String, AdapterError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn info(&self) -> String {
        (**self).info()
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        (**self).connect().await
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        (**self).disconnect().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn write(&mut self, command: &str) -> Result<(), AdapterError> {
        (**self).write(command).await
    }

    async fn ask(&mut self, query: &str) -> Result<String, AdapterError> {
        (**self).ask(query).await
    }
}
