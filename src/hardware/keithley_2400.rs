//! Keithley 2400 SourceMeter driver
//!
//! SCPI command set used:
//! - `:SOUR:FUNC:MODE VOLT|CURR` - select the sourced quantity
//! - `:SOUR:FUNC VOLT;:SOUR:VOLT <v>` - apply a voltage
//! - `:SOUR:FUNC CURR;:SOUR:CURR <i>` - apply a current
//! - `VOLT:RANG:AUTO ON` / `CURR:RANG:AUTO ON` then `:READ?` - measure
//! - `:OUTP ON;` / `:OUTP OFF;` - output relay
//!
//! `:READ?` returns a comma-separated record (`voltage,current,resistance,time,status`).
//! A voltage reading takes the first field, a current reading the second.
//! Source levels are written in exponent form (`2.5E-7`) so small values are
//! not rounded away.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::adapters::Transport;
use crate::hardware::capabilities::{ChannelState, InstrumentError, SourceKind, SourceMeasure};

const READ_QUERY: &str = ":READ?";

/// Parse one field of a `:READ?` record.
///
/// Empty responses fail with [`InstrumentError::EmptyResponse`], missing or
/// non-numeric fields with [`InstrumentError::MalformedResponse`].
pub fn parse_reading(query: &str, response: &str, field: usize) -> Result<f64, InstrumentError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(InstrumentError::EmptyResponse {
            query: query.to_string(),
        });
    }

    trimmed
        .split(',')
        .nth(field)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .ok_or_else(|| InstrumentError::MalformedResponse {
            query: query.to_string(),
            response: trimmed.to_string(),
        })
}

fn reading_field(channel: SourceKind) -> usize {
    match channel {
        SourceKind::Voltage => 0,
        SourceKind::Current => 1,
    }
}

struct Inner {
    transport: Box<dyn Transport>,
    state: ChannelState,
}

/// Keithley 2400 reached through any [`Transport`] (serial, Prologix GPIB).
pub struct Keithley2400 {
    inner: Mutex<Inner>,
}

impl Keithley2400 {
    /// Driver over `transport`. Call [`connect`](Self::connect) before use.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                state: ChannelState::default(),
            }),
        }
    }

    /// Open the transport.
    pub async fn connect(&self) -> Result<(), InstrumentError> {
        let mut inner = self.inner.lock().await;
        inner.transport.connect().await?;
        info!("Keithley 2400 connected via {}", inner.transport.info());
        Ok(())
    }

    /// Switch the output off and close the transport.
    pub async fn disconnect(&self) -> Result<(), InstrumentError> {
        let mut inner = self.inner.lock().await;
        if inner.transport.is_connected() {
            inner.transport.write(":OUTP OFF;").await?;
            inner.state.output_enabled = false;
        }
        inner.transport.disconnect().await?;
        Ok(())
    }

    async fn write(&self, command: &str) -> Result<(), InstrumentError> {
        let mut inner = self.inner.lock().await;
        if !inner.transport.is_connected() {
            return Err(InstrumentError::NotConnected);
        }
        debug!("KT2400 <- {}", command);
        inner.transport.write(command).await?;
        Ok(())
    }

    /// Select voltage as the sourced quantity.
    pub async fn configure_voltage_source(&self) -> Result<(), InstrumentError> {
        self.configure(SourceKind::Voltage).await
    }

    /// Select current as the sourced quantity.
    pub async fn configure_current_source(&self) -> Result<(), InstrumentError> {
        self.configure(SourceKind::Current).await
    }

    /// Source `volts`.
    pub async fn set_voltage(&self, volts: f64) -> Result<(), InstrumentError> {
        self.source(SourceKind::Voltage, volts).await
    }

    /// Source `amps`.
    pub async fn set_current(&self, amps: f64) -> Result<(), InstrumentError> {
        self.source(SourceKind::Current, amps).await
    }

    /// Auto-ranged voltage reading.
    pub async fn measure_voltage(&self) -> Result<f64, InstrumentError> {
        self.measure(SourceKind::Voltage).await
    }

    /// Auto-ranged current reading.
    pub async fn measure_current(&self) -> Result<f64, InstrumentError> {
        self.measure(SourceKind::Current).await
    }

    /// Close the output relay.
    pub async fn enable_output(&self) -> Result<(), InstrumentError> {
        self.write(":OUTP ON;").await?;
        self.inner.lock().await.state.output_enabled = true;
        Ok(())
    }

    /// Open the output relay.
    pub async fn disable_output(&self) -> Result<(), InstrumentError> {
        self.write(":OUTP OFF;").await?;
        self.inner.lock().await.state.output_enabled = false;
        Ok(())
    }

    /// Source mode, output level and compliance limit in one command.
    ///
    /// The compliance applies to the measured quantity: amps when sourcing
    /// voltage, volts when sourcing current.
    pub async fn configure_output(
        &self,
        kind: SourceKind,
        output_level: f64,
        compliance: f64,
    ) -> Result<(), InstrumentError> {
        if !output_level.is_finite() || !compliance.is_finite() || compliance <= 0.0 {
            return Err(InstrumentError::InvalidArgument(format!(
                "output level {output_level} / compliance {compliance} rejected"
            )));
        }

        let function = kind.scpi_function();
        let protection = kind.complement().scpi_function();
        let command = format!(
            ":SOUR:FUNC {function};:SOUR:{function} {output_level:E};:{protection}:PROT {compliance};"
        );
        self.write(&command).await?;

        let mut inner = self.inner.lock().await;
        inner.state.sourcing = Some(kind);
        inner.state.last_source = Some(output_level);
        Ok(())
    }
}

#[async_trait]
impl SourceMeasure for Keithley2400 {
    fn name(&self) -> &str {
        "Keithley 2400"
    }

    async fn configure(&self, kind: SourceKind) -> Result<(), InstrumentError> {
        self.write(&format!(":SOUR:FUNC:MODE {}", kind.scpi_function()))
            .await?;
        self.inner.lock().await.state.sourcing = Some(kind);
        Ok(())
    }

    async fn source(&self, kind: SourceKind, value: f64) -> Result<(), InstrumentError> {
        if !value.is_finite() {
            return Err(InstrumentError::InvalidArgument(format!(
                "source value must be finite, got {value}"
            )));
        }
        let function = kind.scpi_function();
        self.write(&format!(":SOUR:FUNC {function};:SOUR:{function} {value:E}"))
            .await?;

        let mut inner = self.inner.lock().await;
        inner.state.sourcing = Some(kind);
        inner.state.last_source = Some(value);
        Ok(())
    }

    async fn measure(&self, channel: SourceKind) -> Result<f64, InstrumentError> {
        let mut inner = self.inner.lock().await;
        if !inner.transport.is_connected() {
            return Err(InstrumentError::NotConnected);
        }

        inner
            .transport
            .write(&format!("{}:RANG:AUTO ON", channel.scpi_function()))
            .await?;
        let response = inner.transport.ask(READ_QUERY).await?;
        debug!("KT2400 -> {}", response);

        let value = parse_reading(READ_QUERY, &response, reading_field(channel))?;
        inner.state.record_measure(channel, value);
        Ok(value)
    }

    async fn channel_state(&self) -> ChannelState {
        self.inner.lock().await.state
    }
}
