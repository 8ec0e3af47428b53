//! Serial transport for RS-232/USB-Serial instruments
//!
//! Provides a [`Transport`] implementation over the `serialport` crate, used by the
//! Keithley 2400 driver either directly (RS-232 option) or behind a Prologix
//! GPIB-USB controller.

use super::{AdapterError, Transport};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::sync::Arc;
#[cfg(feature = "instrument_serial")]
use tokio::sync::Mutex;

/// Serial adapter for RS-232 communication
///
/// Blocking serial I/O runs on Tokio's blocking task executor so a slow
/// instrument never stalls the runtime.
#[derive(Clone)]
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Read timeout for a whole response line
    timeout: Duration,

    /// Line terminator for commands (e.g., "\n")
    line_terminator: String,

    /// Response line ending character (e.g., '\n')
    response_delimiter: char,

    #[cfg(feature = "instrument_serial")]
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
}

impl SerialAdapter {
    /// Create a new serial adapter with default settings
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    /// * `baud_rate` - Communication speed (e.g., 9600, 115200)
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            timeout: Duration::from_secs(1),
            line_terminator: "\n".to_string(),
            response_delimiter: '\n',
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    /// Set read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set line terminator for commands
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    /// Set response delimiter character
    pub fn with_response_delimiter(mut self, delimiter: char) -> Self {
        self.response_delimiter = delimiter;
        self
    }

    #[cfg(feature = "instrument_serial")]
    fn port(&self) -> Result<Arc<Mutex<Box<dyn SerialPort>>>, AdapterError> {
        self.port.clone().ok_or(AdapterError::NotConnected)
    }
}

#[cfg(feature = "instrument_serial")]
#[async_trait]
impl Transport for SerialAdapter {
    fn info(&self) -> String {
        format!("SerialAdapter({} @ {} baud)", self.port_name, self.baud_rate)
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(Duration::from_millis(100)) // Internal read timeout
            .open()
            .map_err(|e| {
                AdapterError::ConnectionFailed(format!(
                    "Failed to open serial port '{}' at {} baud: {}",
                    self.port_name, self.baud_rate, e
                ))
            })?;

        self.port = Some(Arc::new(Mutex::new(port)));
        debug!(
            "Serial port '{}' opened at {} baud",
            self.port_name, self.baud_rate
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        if self.port.take().is_some() {
            debug!("Serial port '{}' closed", self.port_name);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn write(&mut self, command: &str) -> Result<(), AdapterError> {
        let port = self.port()?;
        let payload = format!("{}{}", command, self.line_terminator);

        tokio::task::spawn_blocking(move || {
            use std::io::Write;

            let mut port_guard = port.blocking_lock();
            port_guard.write_all(payload.as_bytes())?;
            port_guard.flush()?;
            Ok::<(), AdapterError>(())
        })
        .await
        .map_err(|e| AdapterError::SendFailed(format!("Serial I/O task panicked: {e}")))??;

        debug!("Sent serial command: {}", command);
        Ok(())
    }

    async fn ask(&mut self, query: &str) -> Result<String, AdapterError> {
        self.write(query).await?;

        let port = self.port()?;
        let delimiter = self.response_delimiter;
        let timeout = self.timeout;

        let response = tokio::task::spawn_blocking(move || {
            use std::io::Read;

            let mut port_guard = port.blocking_lock();
            let mut response = String::new();
            let mut buffer = [0u8; 1];
            let start = std::time::Instant::now();

            loop {
                if start.elapsed() > timeout {
                    return Err(AdapterError::Timeout(timeout));
                }

                match port_guard.read(&mut buffer) {
                    Ok(0) => {
                        return Err(AdapterError::QueryFailed(
                            "Unexpected EOF from serial port".into(),
                        ))
                    }
                    Ok(_) => {
                        let ch = buffer[0] as char;
                        if ch == delimiter {
                            break;
                        }
                        response.push(ch);
                    }
                    // Port timeout is shorter than our overall timeout
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(e) => return Err(AdapterError::Io(e)),
                }
            }

            Ok(response.trim().to_string())
        })
        .await
        .map_err(|e| AdapterError::QueryFailed(format!("Serial I/O task panicked: {e}")))??;

        debug!("Received serial response: {}", response);
        Ok(response)
    }
}

#[cfg(not(feature = "instrument_serial"))]
#[async_trait]
impl Transport for SerialAdapter {
    fn info(&self) -> String {
        format!("SerialAdapter({} @ {} baud)", self.port_name, self.baud_rate)
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        debug!(
            "Refusing to open '{}': serial support not compiled in",
            self.port_name
        );
        Err(AdapterError::FeatureNotEnabled("instrument_serial".into()))
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn write(&mut self, _command: &str) -> Result<(), AdapterError> {
        Err(AdapterError::FeatureNotEnabled("instrument_serial".into()))
    }

    async fn ask(&mut self, _query: &str) -> Result<String, AdapterError> {
        Err(AdapterError::FeatureNotEnabled("instrument_serial".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_adapter_creation() {
        let adapter = SerialAdapter::new("/dev/ttyUSB0".to_string(), 9600);
        assert!(!adapter.is_connected());
        assert_eq!(adapter.port_name, "/dev/ttyUSB0");
        assert_eq!(adapter.baud_rate, 9600);
    }

    #[test]
    fn test_serial_adapter_builder() {
        let adapter = SerialAdapter::new("/dev/ttyUSB0".to_string(), 9600)
            .with_timeout(Duration::from_millis(500))
            .with_line_terminator("\r\n".to_string())
            .with_response_delimiter('\r');

        assert_eq!(adapter.timeout, Duration::from_millis(500));
        assert_eq!(adapter.line_terminator, "\r\n");
        assert_eq!(adapter.response_delimiter, '\r');
    }

    #[test]
    fn test_info_string() {
        let adapter = SerialAdapter::new("COM3".to_string(), 115200);
        let info = adapter.info();
        assert!(info.contains("COM3"));
        assert!(info.contains("115200"));
    }

    #[cfg(not(feature = "instrument_serial"))]
    #[tokio::test]
    async fn test_connect_without_feature_is_rejected() {
        let mut adapter = SerialAdapter::new("/dev/ttyUSB0".to_string(), 9600);
        assert!(matches!(
            adapter.connect().await,
            Err(AdapterError::FeatureNotEnabled(_))
        ));
    }
}
