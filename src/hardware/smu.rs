//! Instrument selection.
//!
//! [`Smu`] is the one instrument handle the rest of the crate holds. The backend
//! (simulated or physical) is chosen once, when the handle is built from
//! [`InstrumentSettings`], and never re-checked per operation.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::adapters::{PrologixAdapter, SerialAdapter, Transport};
use crate::config::{DriverKind, InstrumentSettings};
use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::{ChannelState, InstrumentError, SourceKind, SourceMeasure};
use crate::hardware::keithley_2400::Keithley2400;
use crate::hardware::mock::MockSmu;

/// A source-measure unit, simulated or physical.
pub enum Smu {
    /// Deterministic solar-cell simulation
    Mock(MockSmu),
    /// Keithley 2400 over serial or Prologix GPIB
    Keithley2400(Keithley2400),
}

impl Smu {
    /// Build the instrument described by `settings`, connect it and configure it
    /// to source `kind` at zero output.
    pub async fn from_settings(settings: &InstrumentSettings, kind: SourceKind) -> AppResult<Self> {
        let smu = match settings.driver {
            DriverKind::Mock => Smu::Mock(MockSmu::with_model(settings.model)),
            DriverKind::Keithley2400 => {
                let port = settings.port.clone().ok_or_else(|| {
                    DaqError::Configuration("instrument.port is required for keithley2400".into())
                })?;
                let serial = SerialAdapter::new(port, settings.baud_rate)
                    .with_timeout(Duration::from_millis(settings.timeout_ms));

                let transport: Box<dyn Transport> = match settings.gpib_address {
                    Some(address) => Box::new(
                        PrologixAdapter::new(serial, address)
                            .map_err(|e| DaqError::Configuration(e.to_string()))?,
                    ),
                    None => Box::new(serial),
                };

                let device = Keithley2400::new(transport);
                device.connect().await?;
                device
                    .configure_output(kind, 0.0, settings.compliance)
                    .await?;
                device.enable_output().await?;
                Smu::Keithley2400(device)
            }
        };

        smu.configure(kind).await?;
        info!("Instrument ready: {}", smu.name());
        Ok(smu)
    }

    /// True for the simulated instrument.
    pub fn is_mock(&self) -> bool {
        matches!(self, Smu::Mock(_))
    }

    /// Switch the output off and release the transport.
    pub async fn shutdown(&self) -> AppResult<()> {
        match self {
            Smu::Mock(_) => Ok(()),
            Smu::Keithley2400(device) => device.disconnect().await.map_err(DaqError::from),
        }
    }
}

#[async_trait]
impl SourceMeasure for Smu {
    fn name(&self) -> &str {
        match self {
            Smu::Mock(device) => device.name(),
            Smu::Keithley2400(device) => device.name(),
        }
    }

    async fn configure(&self, kind: SourceKind) -> Result<(), InstrumentError> {
        match self {
            Smu::Mock(device) => device.configure(kind).await,
            Smu::Keithley2400(device) => device.configure(kind).await,
        }
    }

    async fn source(&self, kind: SourceKind, value: f64) -> Result<(), InstrumentError> {
        match self {
            Smu::Mock(device) => device.source(kind, value).await,
            Smu::Keithley2400(device) => device.source(kind, value).await,
        }
    }

    async fn measure(&self, channel: SourceKind) -> Result<f64, InstrumentError> {
        match self {
            Smu::Mock(device) => device.measure(channel).await,
            Smu::Keithley2400(device) => device.measure(channel).await,
        }
    }

    async fn channel_state(&self) -> ChannelState {
        match self {
            Smu::Mock(device) => device.channel_state().await,
            Smu::Keithley2400(device) => device.channel_state().await,
        }
    }

    async fn source_and_measure_batch(
        &self,
        kind: SourceKind,
        values: &[f64],
    ) -> Result<Vec<f64>, InstrumentError> {
        match self {
            Smu::Mock(device) => device.source_and_measure_batch(kind, values).await,
            Smu::Keithley2400(device) => device.source_and_measure_batch(kind, values).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_driver_from_settings() {
        let settings = InstrumentSettings::default();
        let smu = Smu::from_settings(&settings, SourceKind::Current)
            .await
            .unwrap();

        assert!(smu.is_mock());
        assert_eq!(smu.name(), "Mock SMU");
        assert_eq!(smu.channel_state().await.sourcing, Some(SourceKind::Current));
        smu.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_real_driver_requires_port() {
        let settings = InstrumentSettings {
            driver: DriverKind::Keithley2400,
            port: None,
            ..InstrumentSettings::default()
        };
        let err = Smu::from_settings(&settings, SourceKind::Voltage)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DaqError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_mock_dispatch_matches_model() {
        let settings = InstrumentSettings::default();
        let smu = Smu::from_settings(&settings, SourceKind::Voltage)
            .await
            .unwrap();

        let measured = smu.source_and_measure(SourceKind::Voltage, 5.0).await.unwrap();
        assert_eq!(measured, settings.model.evaluate(SourceKind::Voltage, 5.0));
    }
}
