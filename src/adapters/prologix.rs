//! Prologix GPIB-USB controller wrapper.
//!
//! The Prologix controller shows up as a serial port and multiplexes GPIB devices
//! by address. Lines starting with `++` configure the controller itself; anything
//! else is forwarded to the addressed instrument. Read-after-write is disabled so
//! plain `write` commands never block waiting for a response.

use super::{AdapterError, Transport};
use async_trait::async_trait;
use tracing::debug;

/// Highest primary address allowed on a GPIB bus.
pub const MAX_GPIB_ADDRESS: u8 = 30;

/// Transport that addresses one GPIB instrument through a Prologix controller.
pub struct PrologixAdapter<T: Transport> {
    inner: T,
    gpib_address: u8,
}

impl<T: Transport> PrologixAdapter<T> {
    /// Wrap `inner` (normally a [`super::SerialAdapter`]) for the device at `gpib_address`.
    pub fn new(inner: T, gpib_address: u8) -> Result<Self, AdapterError> {
        if gpib_address > MAX_GPIB_ADDRESS {
            return Err(AdapterError::InvalidConfig(format!(
                "GPIB address {} out of range 0-{}",
                gpib_address, MAX_GPIB_ADDRESS
            )));
        }
        Ok(Self {
            inner,
            gpib_address,
        })
    }

    /// Address selected with `++addr`.
    pub fn gpib_address(&self) -> u8 {
        self.gpib_address
    }

    /// Borrow the wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for PrologixAdapter<T> {
    fn info(&self) -> String {
        format!("Prologix(GPIB {}) via {}", self.gpib_address, self.inner.info())
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        self.inner.connect().await?;

        // Controller mode, target address, no auto read-after-write, assert EOI.
        for setup in [
            "++mode 1".to_string(),
            format!("++addr {}", self.gpib_address),
            "++auto 0".to_string(),
            "++eoi 1".to_string(),
        ] {
            self.inner.write(&setup).await?;
        }

        debug!("Prologix controller addressed GPIB device {}", self.gpib_address);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn write(&mut self, command: &str) -> Result<(), AdapterError> {
        self.inner.write(command).await
    }

    async fn ask(&mut self, query: &str) -> Result<String, AdapterError> {
        self.inner.write(query).await?;
        self.inner.ask("++read eoi").await
    }
}
